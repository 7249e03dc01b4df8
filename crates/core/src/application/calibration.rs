// Calibration Service - single and batch calibration use cases

use crate::application::runner::JobRunner;
use crate::application::scheduler::{BatchReport, BoundedScheduler};
use crate::application::shutdown::ShutdownToken;
use crate::config::SchedulerConfig;
use crate::domain::{CalibrationResult, Calibrator, ExternalJob};
use crate::error::{AppError, Result};
use crate::port::IdProvider;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Batch report plus the quantities of every successful job
#[derive(Debug, Clone, Serialize)]
pub struct CalibrationBatch {
    pub report: BatchReport,
    /// Submission order, successful jobs only
    pub results: Vec<CalibrationResult>,
}

impl CalibrationBatch {
    pub fn result(&self, label: &str) -> Option<&CalibrationResult> {
        self.results.iter().find(|r| r.label == label)
    }
}

pub struct CalibrationService {
    runner: Arc<JobRunner>,
    id_provider: Arc<dyn IdProvider>,
    scheduler_config: SchedulerConfig,
}

impl CalibrationService {
    pub fn new(
        runner: Arc<JobRunner>,
        id_provider: Arc<dyn IdProvider>,
        scheduler_config: SchedulerConfig,
    ) -> Self {
        Self {
            runner,
            id_provider,
            scheduler_config,
        }
    }

    fn build_job(&self, calibrator: &Calibrator) -> Result<ExternalJob> {
        Ok(calibrator.build_job(self.id_provider.generate_id())?)
    }

    /// Run one calibrator and block until its quantities are available
    ///
    /// # Errors
    /// - AppError::Domain for missing required parameters
    /// - AppError::Launch if the binary cannot be started
    /// - AppError::JobFailed for a non-zero exit or an unusable artifact
    pub async fn calibrate(&self, calibrator: &Calibrator) -> Result<CalibrationResult> {
        let job = self.build_job(calibrator)?;
        let outcome = self.runner.run(&job).await?;
        calibrator.interpret(&outcome).ok_or_else(|| {
            AppError::Internal(format!("{} succeeded without an outcome", job))
        })
    }

    /// Run many calibrators under the concurrency cap
    ///
    /// Individual job failures are reported, not raised. Every calibrator is
    /// validated before anything is launched.
    ///
    /// # Errors
    /// - AppError::Domain if any calibrator is missing a required parameter
    pub async fn calibrate_batch(
        &self,
        calibrators: Vec<Calibrator>,
        shutdown: Option<ShutdownToken>,
    ) -> Result<CalibrationBatch> {
        let jobs = calibrators
            .iter()
            .map(|c| self.build_job(c))
            .collect::<Result<Vec<_>>>()?;
        let ids: Vec<String> = jobs.iter().map(|j| j.id().to_string()).collect();

        info!(jobs = jobs.len(), "Calibration batch submitted");
        let scheduler = BoundedScheduler::new(self.runner.clone(), self.scheduler_config);
        let report = scheduler.run_all(jobs, shutdown).await?;

        let results = calibrators
            .iter()
            .zip(&ids)
            .filter_map(|(calibrator, id)| calibrator.interpret(report.get(id)?))
            .collect();

        Ok(CalibrationBatch { report, results })
    }
}
