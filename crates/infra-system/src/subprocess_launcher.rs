// Subprocess launcher implementation
// reason: tokio::process gives non-blocking try_wait for the polling scheduler
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tracing::debug;

use calib_core::domain::ExternalJob;
use calib_core::port::{ProcessError, ProcessExit, ProcessLauncher, RunningProcess};

/// Where a child's console output goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChildOutput {
    /// Share the orchestrator's stdout and stderr
    #[default]
    Inherit,
    /// Send the child's stdout to our stderr (keeps our stdout machine-readable)
    Stderr,
    Discard,
}

/// Launches ExternalJobs as OS child processes
///
/// Children are never killed when their handle is dropped: an interrupted
/// batch lets running jobs finish on their own.
#[derive(Debug, Clone, Default)]
pub struct SubprocessLauncher {
    output: ChildOutput,
}

impl SubprocessLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, output: ChildOutput) -> Self {
        self.output = output;
        self
    }

    fn command(&self, job: &ExternalJob) -> Command {
        let mut command = Command::new(job.executable());
        command
            .args(job.command_args())
            .stdin(Stdio::null())
            .kill_on_drop(false);

        match self.output {
            ChildOutput::Inherit => {}
            ChildOutput::Stderr => {
                command.stdout(Stdio::from(std::io::stderr()));
            }
            ChildOutput::Discard => {
                command.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }
        command
    }
}

impl ProcessLauncher for SubprocessLauncher {
    fn spawn(&self, job: &ExternalJob) -> Result<Box<dyn RunningProcess>, ProcessError> {
        let child = self
            .command(job)
            .spawn()
            .map_err(|e| ProcessError::SpawnFailed(format!("{}: {}", job.executable().display(), e)))?;

        debug!(job_id = %job.id(), pid = ?child.id(), "Child process spawned");
        Ok(Box::new(ChildProcess {
            pid: child.id(),
            child,
        }))
    }
}

struct ChildProcess {
    pid: Option<u32>,
    child: Child,
}

fn to_exit(status: ExitStatus) -> ProcessExit {
    ProcessExit {
        code: status.code(),
    }
}

#[async_trait]
impl RunningProcess for ChildProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn try_exit(&mut self) -> Result<Option<ProcessExit>, ProcessError> {
        self.child
            .try_wait()
            .map(|status| status.map(to_exit))
            .map_err(|e| ProcessError::ProbeFailed(e.to_string()))
    }

    async fn wait_exit(&mut self) -> Result<ProcessExit, ProcessError> {
        self.child
            .wait()
            .await
            .map(to_exit)
            .map_err(|e| ProcessError::ProbeFailed(e.to_string()))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use calib_core::domain::{Argument, ResultSchema};
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("tool.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn job(executable: &Path, artifact: &Path) -> ExternalJob {
        ExternalJob::new("job-1", "tool", executable, artifact, ResultSchema::empty())
    }

    #[tokio::test]
    async fn test_exit_code_and_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let exe = script(dir.path(), r#"printf '%s %s\n' "$1" "$2" > "$4"; exit 3"#);
        let artifact = dir.path().join("out.txt");
        let job = job(&exe, &artifact)
            .with_argument(Argument::valued("-b", "20"))
            .with_argument(Argument::valued("-d", artifact.display().to_string()));

        let launcher = SubprocessLauncher::new().with_output(ChildOutput::Discard);
        launcher.verify(&job).unwrap();
        let mut process = launcher.spawn(&job).unwrap();
        assert!(process.pid().is_some());

        let exit = process.wait_exit().await.unwrap();
        assert_eq!(exit.code, Some(3));
        assert_eq!(std::fs::read_to_string(&artifact).unwrap().trim(), "-b 20");
    }

    #[tokio::test]
    async fn test_try_exit_polls_until_done() {
        let dir = tempfile::tempdir().unwrap();
        let exe = script(dir.path(), "sleep 0.2");
        let launcher = SubprocessLauncher::new();
        let mut process = launcher.spawn(&job(&exe, &dir.path().join("a"))).unwrap();

        assert!(process.try_exit().unwrap().is_none());
        let exit = loop {
            if let Some(exit) = process.try_exit().unwrap() {
                break exit;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        };
        assert!(exit.success());
    }

    #[test]
    fn test_verify_rejects_non_executable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::write(&path, "not a program").unwrap();

        let launcher = SubprocessLauncher::new();
        let result = launcher.verify(&job(&path, &dir.path().join("a")));
        assert!(matches!(result, Err(ProcessError::NotExecutable(_))));
    }
}
