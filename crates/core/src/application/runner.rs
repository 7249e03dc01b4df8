// Job Runner - launches one ExternalJob and turns its termination into a JobOutcome

use crate::application::extractor::extract_values;
use crate::domain::{ExternalJob, FailureKind, JobOutcome};
use crate::error::{AppError, Result};
use crate::port::{ProcessError, ProcessExit, ProcessLauncher, RunningProcess, TimeProvider};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Runs external jobs through a ProcessLauncher
pub struct JobRunner {
    launcher: Arc<dyn ProcessLauncher>,
    time_provider: Arc<dyn TimeProvider>,
}

impl JobRunner {
    pub fn new(launcher: Arc<dyn ProcessLauncher>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            launcher,
            time_provider,
        }
    }

    pub fn now_millis(&self) -> i64 {
        self.time_provider.now_millis()
    }

    /// Check the job's executable without touching anything else
    pub fn verify(&self, job: &ExternalJob) -> std::result::Result<(), ProcessError> {
        self.launcher.verify(job)
    }

    /// Launch a job without waiting for it
    ///
    /// Order: verify executable, remove stale artifact, spawn. A missing
    /// executable fails before the artifact is touched.
    pub fn launch(&self, job: &ExternalJob) -> std::result::Result<Box<dyn RunningProcess>, ProcessError> {
        self.launcher.verify(job)?;

        remove_artifact(job.artifact()).map_err(|e| {
            ProcessError::SpawnFailed(format!(
                "stale artifact {} could not be removed: {}",
                job.artifact().display(),
                e
            ))
        })?;

        info!(
            job_id = %job.id(),
            label = %job.label(),
            command = %job.command_line(),
            "Launching external job"
        );

        let process = self.launcher.spawn(job)?;
        info!(job_id = %job.id(), pid = ?process.pid(), "External job started");
        Ok(process)
    }

    /// Outcome for a job that never started
    pub fn launch_failure(&self, job: &ExternalJob, err: &ProcessError) -> JobOutcome {
        error!(job_id = %job.id(), label = %job.label(), error = %err, "Job launch failed");
        JobOutcome::failure(
            job.id(),
            job.label(),
            None,
            FailureKind::LaunchFailure {
                reason: err.to_string(),
            },
            0,
        )
    }

    /// Build the outcome of a terminated job
    ///
    /// Extraction runs only on a zero exit. The artifact is removed afterwards
    /// when the job asks for it, whatever the result.
    pub fn finish(
        &self,
        job: &ExternalJob,
        exit: std::result::Result<ProcessExit, ProcessError>,
        started_at: i64,
    ) -> JobOutcome {
        let outcome = match exit {
            Err(e) => {
                warn!(job_id = %job.id(), error = %e, "Lost track of external job");
                let duration_ms = self.now_millis() - started_at;
                JobOutcome::failure(
                    job.id(),
                    job.label(),
                    None,
                    FailureKind::ExitFailure { code: None },
                    duration_ms,
                )
            }
            Ok(exit) if !exit.success() => {
                let duration_ms = self.now_millis() - started_at;
                JobOutcome::failure(
                    job.id(),
                    job.label(),
                    exit.code,
                    FailureKind::ExitFailure { code: exit.code },
                    duration_ms,
                )
            }
            Ok(_) => {
                let extracted = extract_values(job.artifact(), job.schema());
                let duration_ms = self.now_millis() - started_at;
                match extracted {
                    Ok(values) => JobOutcome::success(job.id(), job.label(), values, duration_ms),
                    Err(e) => {
                        warn!(job_id = %job.id(), error = %e, "Extraction failed despite zero exit");
                        JobOutcome::failure(job.id(), job.label(), Some(0), (&e).into(), duration_ms)
                    }
                }
            }
        };

        if job.deletes_artifact() {
            if let Err(e) = remove_artifact(job.artifact()) {
                warn!(
                    job_id = %job.id(),
                    artifact = %job.artifact().display(),
                    error = %e,
                    "Could not remove artifact"
                );
            }
        }

        match &outcome.failure {
            None => info!(
                job_id = %job.id(),
                label = %job.label(),
                duration_ms = outcome.duration_ms,
                values = ?outcome.values,
                "External job succeeded"
            ),
            Some(kind) => error!(
                job_id = %job.id(),
                label = %job.label(),
                exit_code = ?outcome.exit_code,
                failure = %kind,
                "External job failed"
            ),
        }
        outcome
    }

    /// Run one job to completion, recording any failure in the outcome
    pub async fn execute(&self, job: &ExternalJob) -> JobOutcome {
        let mut process = match self.launch(job) {
            Ok(p) => p,
            Err(e) => return self.launch_failure(job, &e),
        };
        let started_at = self.now_millis();
        let exit = process.wait_exit().await;
        self.finish(job, exit, started_at)
    }

    /// Single-job mode: any failure is a hard error
    ///
    /// # Errors
    /// - AppError::Launch if the executable cannot be started
    /// - AppError::JobFailed for a non-zero exit or an unusable artifact
    pub async fn run(&self, job: &ExternalJob) -> Result<JobOutcome> {
        let mut process = self.launch(job)?;
        let started_at = self.now_millis();
        let exit = process.wait_exit().await;
        let outcome = self.finish(job, exit, started_at);

        match &outcome.failure {
            None => Ok(outcome),
            Some(kind) => Err(AppError::JobFailed {
                job: job.to_string(),
                kind: kind.clone(),
            }),
        }
    }
}

/// Remove an artifact; an already-absent file is not an error
fn remove_artifact(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FieldLocator, ResultSchema};
    use crate::port::process_launcher::mocks::{MockLauncher, MockScript};
    use crate::port::time_provider::mocks::SteppingTimeProvider;
    use std::path::PathBuf;

    fn runner(launcher: Arc<MockLauncher>) -> JobRunner {
        JobRunner::new(launcher, Arc::new(SteppingTimeProvider::new(1_000, 10)))
    }

    fn job(dir: &Path, label: &str) -> ExternalJob {
        ExternalJob::new(
            format!("{}-id", label),
            label,
            "/opt/pandora/bin/PandoraPFACalibrate_EMScale",
            dir.join(format!("{}_Calibration.txt", label)),
            ResultSchema::new(vec![FieldLocator::new(2, 3, "ecalToEMMean")]).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_success_extracts_and_deletes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = Arc::new(MockLauncher::new_success());
        launcher.script("em", MockScript::exit(0).writes("header\nEM scale : 1.0078\n"));
        let job = job(dir.path(), "em");

        let outcome = runner(launcher).execute(&job).await;

        assert!(outcome.succeeded);
        assert_eq!(outcome.value("ecalToEMMean"), Some(1.0078));
        assert!(outcome.duration_ms > 0);
        assert!(!job.artifact().exists());
    }

    #[tokio::test]
    async fn test_keep_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = Arc::new(MockLauncher::new_success());
        launcher.script("em", MockScript::exit(0).writes("header\nEM scale : 1.0\n"));
        let job = job(dir.path(), "em").keep_artifact(true);

        let outcome = runner(launcher).execute(&job).await;

        assert!(outcome.succeeded);
        assert!(job.artifact().exists());
    }

    #[tokio::test]
    async fn test_stale_artifact_removed_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path(), "em");
        std::fs::write(job.artifact(), "header\nEM scale : 9.99\n").unwrap();

        // binary exits 0 but writes nothing: the stale file must not be read
        let launcher = Arc::new(MockLauncher::new_success());
        let outcome = runner(launcher).execute(&job).await;

        assert!(!outcome.succeeded);
        assert_eq!(outcome.exit_code, Some(0));
        assert!(matches!(
            outcome.failure,
            Some(FailureKind::ArtifactMissing { .. })
        ));
    }

    #[tokio::test]
    async fn test_non_zero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = Arc::new(MockLauncher::new(MockScript::exit(3).writes("x\nEM scale : 1.0\n")));
        let outcome = runner(launcher).execute(&job(dir.path(), "em")).await;

        assert!(!outcome.succeeded);
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.failure, Some(FailureKind::ExitFailure { code: Some(3) }));
        assert!(outcome.values.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_output() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = Arc::new(MockLauncher::new(MockScript::exit(0).writes("only one line\n")));
        let job = job(dir.path(), "em");
        let outcome = runner(launcher).execute(&job).await;

        assert!(!outcome.succeeded);
        assert!(matches!(
            outcome.failure,
            Some(FailureKind::MalformedOutput { .. })
        ));
        // deleted even though extraction failed
        assert!(!job.artifact().exists());
    }

    #[tokio::test]
    async fn test_launch_failure_does_not_touch_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = Arc::new(MockLauncher::new_success());
        launcher.missing_executable("em");
        let job = job(dir.path(), "em");
        std::fs::write(job.artifact(), "left over by a previous run").unwrap();

        let err = runner(launcher.clone()).run(&job).await.unwrap_err();

        assert!(matches!(err, AppError::Launch(ProcessError::NotFound(_))));
        assert!(job.artifact().exists());
        assert!(launcher.stats().launched().is_empty());
    }

    #[tokio::test]
    async fn test_run_surfaces_failure_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = Arc::new(MockLauncher::new(MockScript::exit(1)));
        let err = runner(launcher).run(&job(dir.path(), "em")).await.unwrap_err();

        match err {
            AppError::JobFailed { kind, .. } => {
                assert_eq!(kind, FailureKind::ExitFailure { code: Some(1) })
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_remove_artifact_absent_is_ok() {
        assert!(remove_artifact(&PathBuf::from("/tmp/definitely-absent-calib-artifact")).is_ok());
    }
}
