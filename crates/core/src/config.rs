// Configuration - installation roots and scheduler knobs

use crate::application::constants::{
    ANALYSIS_BIN_DIR, ANALYSIS_ROOT_ENV, DEFAULT_MAX_CONCURRENCY, DEFAULT_POLL_INTERVAL,
    MIN_POLL_INTERVAL,
};
use crate::domain::ExecutableLocation;
use crate::error::{AppError, Result};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Where external binaries live on this host
#[derive(Debug, Clone, Default)]
pub struct ToolchainConfig {
    /// Install root of the analysis binaries (`<root>/bin/<name>`)
    pub analysis_root: Option<PathBuf>,
    /// Directories searched for driver executables
    pub search_path: Vec<PathBuf>,
}

impl ToolchainConfig {
    /// Read `PANDORA_ANALYSIS_DIR` and `PATH`
    pub fn from_env() -> Self {
        let analysis_root = std::env::var_os(ANALYSIS_ROOT_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let search_path = std::env::var_os("PATH")
            .map(|p| std::env::split_paths(&p).collect())
            .unwrap_or_default();

        debug!(analysis_root = ?analysis_root, "Toolchain configuration loaded");
        Self {
            analysis_root,
            search_path,
        }
    }

    pub fn with_analysis_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.analysis_root = Some(root.into());
        self
    }

    /// Resolve a calibrator's executable to a concrete path
    ///
    /// Existence of install-root binaries is checked at launch, not here.
    ///
    /// # Errors
    /// - AppError::Config if the install root is unset or a search-path binary is absent
    pub fn resolve(&self, location: &ExecutableLocation) -> Result<PathBuf> {
        match location {
            ExecutableLocation::InstallRoot { binary } => {
                let root = self.analysis_root.as_ref().ok_or_else(|| {
                    AppError::Config(format!(
                        "{} is not set; cannot locate {}",
                        ANALYSIS_ROOT_ENV, binary
                    ))
                })?;
                Ok(root.join(ANALYSIS_BIN_DIR).join(binary))
            }
            ExecutableLocation::SearchPath { binary } => self
                .search_path
                .iter()
                .map(|dir| dir.join(binary))
                .find(|candidate| candidate.is_file())
                .ok_or_else(|| AppError::Config(format!("{} not found on PATH", binary))),
            ExecutableLocation::Absolute { path } => Ok(path.clone()),
        }
    }
}

/// Concurrency cap and poll interval of a BoundedScheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    max_concurrency: NonZeroUsize,
    poll_interval: Duration,
}

impl SchedulerConfig {
    /// # Errors
    /// - AppError::Validation if `max_concurrency` is 0 or the interval is below 10ms
    pub fn new(max_concurrency: usize, poll_interval: Duration) -> Result<Self> {
        let max_concurrency = NonZeroUsize::new(max_concurrency).ok_or_else(|| {
            AppError::Validation("max concurrency must be at least 1".to_string())
        })?;
        if poll_interval < MIN_POLL_INTERVAL {
            return Err(AppError::Validation(format!(
                "poll interval must be at least {}ms",
                MIN_POLL_INTERVAL.as_millis()
            )));
        }
        Ok(Self {
            max_concurrency,
            poll_interval,
        })
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency.get()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: NonZeroUsize::new(DEFAULT_MAX_CONCURRENCY).unwrap_or(NonZeroUsize::MIN),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}
