//! Bounded Scheduler - runs a batch of external jobs with a concurrency cap
//!
//! Per-job state machine: Pending -> Running -> Completed. There is no
//! cancelled or retrying state; once running, a job runs to termination.
//!
//! The loop polls: there is no portable way to block on "whichever of N
//! child processes exits first", so each iteration probes every running job
//! without blocking and sleeps for the poll interval when it had nothing to
//! launch. A finished job's slot is reclaimed at most one interval late.
//!
//! Limitation: there is no per-job timeout. A hung process holds its slot
//! until it exits or the operator kills it.

use crate::application::runner::JobRunner;
use crate::application::shutdown::ShutdownToken;
use crate::config::SchedulerConfig;
use crate::domain::{ExternalJob, JobId, JobOutcome};
use crate::error::{AppError, Result};
use crate::port::RunningProcess;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Job counts per state at one observation point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
}

impl StateCounts {
    pub fn total(&self) -> usize {
        self.pending + self.running + self.completed
    }
}

struct RunningJob {
    job: ExternalJob,
    process: Box<dyn RunningProcess>,
    started_at: i64,
}

/// Scheduler bookkeeping, owned by one run
///
/// Every job is in exactly one of pending, running or completed.
pub struct SchedulerState {
    pending: VecDeque<ExternalJob>,
    running: Vec<RunningJob>,
    completed: HashMap<JobId, JobOutcome>,
}

impl SchedulerState {
    /// Seed the pending queue in submission order
    ///
    /// # Errors
    /// - AppError::Validation if two jobs share an ID
    pub fn new(jobs: Vec<ExternalJob>) -> Result<Self> {
        let mut ids = HashSet::new();
        let mut artifacts = HashSet::new();
        for job in &jobs {
            if !ids.insert(job.id()) {
                return Err(AppError::Validation(format!(
                    "duplicate job id in batch: {}",
                    job.id()
                )));
            }
            if !artifacts.insert(job.artifact()) {
                warn!(
                    job_id = %job.id(),
                    artifact = %job.artifact().display(),
                    "Artifact path shared with another job in this batch"
                );
            }
        }

        Ok(Self {
            pending: jobs.into(),
            running: Vec::new(),
            completed: HashMap::new(),
        })
    }

    pub fn counts(&self) -> StateCounts {
        StateCounts {
            pending: self.pending.len(),
            running: self.running.len(),
            completed: self.completed.len(),
        }
    }

    /// Nothing left to launch and nothing running
    pub fn is_drained(&self) -> bool {
        self.pending.is_empty() && self.running.is_empty()
    }

    pub fn outcome(&self, id: &str) -> Option<&JobOutcome> {
        self.completed.get(id)
    }

    /// Verify every pending executable before the first launch
    ///
    /// Jobs whose binary is missing go straight to completed as launch
    /// failures, so they surface at submission rather than when their turn
    /// comes. `launch_ready` repeats the check at spawn time. Returns the
    /// number of jobs rejected.
    pub fn screen_executables(&mut self, runner: &JobRunner) -> usize {
        let mut rejected = 0;
        let mut kept = VecDeque::with_capacity(self.pending.len());
        for job in self.pending.drain(..) {
            match runner.verify(&job) {
                Ok(()) => kept.push_back(job),
                Err(e) => {
                    let outcome = runner.launch_failure(&job, &e);
                    self.completed.insert(job.id().to_string(), outcome);
                    rejected += 1;
                }
            }
        }
        self.pending = kept;
        rejected
    }

    /// Launch pending jobs in FIFO order until `max_concurrency` are running
    ///
    /// A job that fails to launch goes straight to completed and never
    /// occupies a slot. Returns the number of jobs popped from pending.
    pub fn launch_ready(&mut self, runner: &JobRunner, max_concurrency: usize) -> usize {
        let mut popped = 0;
        while self.running.len() < max_concurrency {
            let Some(job) = self.pending.pop_front() else {
                break;
            };
            popped += 1;

            match runner.launch(&job) {
                Ok(process) => {
                    let started_at = runner.now_millis();
                    self.running.push(RunningJob {
                        job,
                        process,
                        started_at,
                    });
                }
                Err(e) => {
                    let outcome = runner.launch_failure(&job, &e);
                    self.completed.insert(job.id().to_string(), outcome);
                }
            }
        }
        popped
    }

    /// Probe every running job once; move terminated ones to completed
    ///
    /// Returns the number of jobs that completed.
    pub fn reap(&mut self, runner: &JobRunner) -> usize {
        let mut reaped = 0;
        let mut i = 0;
        while i < self.running.len() {
            let exit = match self.running[i].process.try_exit() {
                Ok(None) => {
                    i += 1;
                    continue;
                }
                Ok(Some(exit)) => Ok(exit),
                Err(e) => Err(e),
            };

            let finished = self.running.swap_remove(i);
            let outcome = runner.finish(&finished.job, exit, finished.started_at);
            self.completed.insert(finished.job.id().to_string(), outcome);
            reaped += 1;
        }
        reaped
    }

    fn into_report(self, order: Vec<JobId>, interrupted: bool) -> BatchReport {
        let mut completed = self.completed;
        let mut outcomes = Vec::with_capacity(completed.len());
        for id in &order {
            if let Some(outcome) = completed.remove(id) {
                outcomes.push(outcome);
            }
        }

        let not_launched = self
            .pending
            .into_iter()
            .map(|job| UnlaunchedJob {
                job_id: job.id().to_string(),
                label: job.label().to_string(),
            })
            .collect();

        BatchReport {
            outcomes,
            not_launched,
            interrupted,
        }
    }
}

/// A job left in pending when the batch was interrupted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnlaunchedJob {
    pub job_id: JobId,
    pub label: String,
}

/// Aggregate result of a batch
///
/// Outcomes are listed in submission order; `completed` population order
/// (real termination order) is not preserved.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    outcomes: Vec<JobOutcome>,
    not_launched: Vec<UnlaunchedJob>,
    interrupted: bool,
}

impl BatchReport {
    pub fn outcomes(&self) -> &[JobOutcome] {
        &self.outcomes
    }

    pub fn get(&self, job_id: &str) -> Option<&JobOutcome> {
        self.outcomes.iter().find(|o| o.job_id == job_id)
    }

    /// Outcomes keyed by job ID
    pub fn as_map(&self) -> HashMap<&str, &JobOutcome> {
        self.outcomes
            .iter()
            .map(|o| (o.job_id.as_str(), o))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes.iter().filter(|o| o.succeeded)
    }

    pub fn failed(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded)
    }

    pub fn not_launched(&self) -> &[UnlaunchedJob] {
        &self.not_launched
    }

    pub fn was_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Every submitted job ran and succeeded
    pub fn all_succeeded(&self) -> bool {
        self.not_launched.is_empty() && self.outcomes.iter().all(|o| o.succeeded)
    }
}

/// Runs batches of jobs with at most `max_concurrency` alive at once
pub struct BoundedScheduler {
    runner: Arc<JobRunner>,
    config: SchedulerConfig,
}

impl BoundedScheduler {
    pub fn new(runner: Arc<JobRunner>, config: SchedulerConfig) -> Self {
        Self { runner, config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run every job and collect one outcome per job
    ///
    /// Executables are verified up front; a missing one is reported as a
    /// launch failure before any job starts. A failing job never stops its
    /// siblings. When `shutdown` fires, no
    /// further job is launched; running jobs are left to terminate and the
    /// unlaunched ones are listed in the report.
    ///
    /// # Errors
    /// - AppError::Validation if two jobs share an ID
    pub async fn run_all(
        &self,
        jobs: Vec<ExternalJob>,
        mut shutdown: Option<ShutdownToken>,
    ) -> Result<BatchReport> {
        let order: Vec<JobId> = jobs.iter().map(|j| j.id().to_string()).collect();
        let mut state = SchedulerState::new(jobs)?;
        let max_concurrency = self.config.max_concurrency();
        let mut interrupted = false;

        let rejected = state.screen_executables(&self.runner);
        if rejected > 0 {
            warn!(rejected, "Jobs with unusable executables will not be launched");
        }

        info!(
            jobs = order.len(),
            max_concurrency,
            poll_interval_ms = self.config.poll_interval().as_millis() as u64,
            "Batch started"
        );

        while !state.is_drained() {
            if !interrupted && shutdown.as_ref().is_some_and(ShutdownToken::is_shutdown) {
                interrupted = true;
                warn!(
                    pending = state.counts().pending,
                    running = state.counts().running,
                    "Interrupt received: no further jobs will be launched"
                );
            }

            let launched = if interrupted {
                0
            } else {
                state.launch_ready(&self.runner, max_concurrency)
            };

            if interrupted && state.counts().running == 0 {
                break;
            }

            if launched == 0 {
                self.pause(&mut shutdown, interrupted).await;
            }

            state.reap(&self.runner);

            let counts = state.counts();
            debug!(
                pending = counts.pending,
                running = counts.running,
                completed = counts.completed,
                "Scheduler tick"
            );
        }

        let report = state.into_report(order, interrupted);
        info!(
            completed = report.len(),
            succeeded = report.succeeded().count(),
            failed = report.failed().count(),
            not_launched = report.not_launched().len(),
            "Batch finished"
        );
        Ok(report)
    }

    /// Sleep one poll interval, waking early on the first interrupt
    async fn pause(&self, shutdown: &mut Option<ShutdownToken>, interrupted: bool) {
        let interval = self.config.poll_interval();
        match shutdown.as_mut() {
            Some(token) if !interrupted => {
                tokio::select! {
                    _ = sleep(interval) => {},
                    _ = token.wait() => {},
                }
            }
            _ => sleep(interval).await,
        }
    }
}
