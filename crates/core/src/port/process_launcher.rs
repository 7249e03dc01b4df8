// Process Launcher Port
// Abstraction over launching an ExternalJob as an OS process and probing it

use crate::domain::ExternalJob;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Exit status of a terminated process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// None when the process was terminated by a signal
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Process-level errors
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Executable not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Not an executable file: {}", .0.display())]
    NotExecutable(PathBuf),

    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Status probe failed: {0}")]
    ProbeFailed(String),
}

/// Handle to a launched process
#[async_trait]
pub trait RunningProcess: Send {
    /// OS process ID, if known
    fn pid(&self) -> Option<u32>;

    /// Non-blocking termination probe
    ///
    /// Returns `Ok(None)` while the process is still running.
    fn try_exit(&mut self) -> Result<Option<ProcessExit>, ProcessError>;

    /// Wait until the process terminates
    async fn wait_exit(&mut self) -> Result<ProcessExit, ProcessError>;
}

/// Process Launcher trait
///
/// Implementations:
/// - SubprocessLauncher (infra-system): real child processes
/// - MockLauncher: scripted processes for scheduler tests
pub trait ProcessLauncher: Send + Sync {
    /// Check that the job's executable can be launched
    ///
    /// Called before any artifact access. The default checks the file system.
    ///
    /// # Errors
    /// - ProcessError::NotFound if the path does not exist
    /// - ProcessError::NotExecutable if it is not a regular executable file
    fn verify(&self, job: &ExternalJob) -> Result<(), ProcessError> {
        verify_executable(job.executable())
    }

    /// Launch the job without waiting for it
    ///
    /// # Errors
    /// - ProcessError::SpawnFailed if the OS refuses to start the process
    fn spawn(&self, job: &ExternalJob) -> Result<Box<dyn RunningProcess>, ProcessError>;
}

/// File-system check shared by launchers
pub fn verify_executable(path: &Path) -> Result<(), ProcessError> {
    let metadata =
        std::fs::metadata(path).map_err(|_| ProcessError::NotFound(path.to_path_buf()))?;
    if !metadata.is_file() {
        return Err(ProcessError::NotExecutable(path.to_path_buf()));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(ProcessError::NotExecutable(path.to_path_buf()));
        }
    }

    Ok(())
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Scripted behavior of one mock process
    #[derive(Debug, Clone)]
    pub struct MockScript {
        /// Exit code reported on termination
        pub exit_code: i32,
        /// Number of probes answered with "still running"
        pub polls: usize,
        /// Content written to the job's artifact on termination
        pub artifact: Option<String>,
    }

    impl MockScript {
        pub fn exit(exit_code: i32) -> Self {
            Self {
                exit_code,
                polls: 0,
                artifact: None,
            }
        }

        pub fn after_polls(mut self, polls: usize) -> Self {
            self.polls = polls;
            self
        }

        pub fn writes(mut self, content: impl Into<String>) -> Self {
            self.artifact = Some(content.into());
            self
        }
    }

    /// Shared counters observed by tests
    #[derive(Debug, Default)]
    pub struct MockStats {
        live: AtomicUsize,
        max_live: AtomicUsize,
        launched: Mutex<Vec<String>>,
        finished: Mutex<Vec<String>>,
    }

    impl MockStats {
        pub fn live(&self) -> usize {
            self.live.load(Ordering::SeqCst)
        }

        /// Highest number of simultaneously live processes
        pub fn max_live(&self) -> usize {
            self.max_live.load(Ordering::SeqCst)
        }

        /// Labels in launch order
        pub fn launched(&self) -> Vec<String> {
            self.launched.lock().unwrap().clone()
        }

        /// Labels in termination order
        pub fn finished(&self) -> Vec<String> {
            self.finished.lock().unwrap().clone()
        }

        fn on_launch(&self, label: &str) {
            let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_live.fetch_max(live, Ordering::SeqCst);
            self.launched.lock().unwrap().push(label.to_string());
        }

        fn on_exit(&self, label: &str) {
            self.live.fetch_sub(1, Ordering::SeqCst);
            self.finished.lock().unwrap().push(label.to_string());
        }
    }

    /// Mock launcher keyed by job label
    pub struct MockLauncher {
        scripts: Mutex<HashMap<String, MockScript>>,
        default_script: MockScript,
        unlaunchable: Mutex<HashSet<String>>,
        stats: Arc<MockStats>,
    }

    impl MockLauncher {
        pub fn new(default_script: MockScript) -> Self {
            Self {
                scripts: Mutex::new(HashMap::new()),
                default_script,
                unlaunchable: Mutex::new(HashSet::new()),
                stats: Arc::new(MockStats::default()),
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockScript::exit(0))
        }

        pub fn script(&self, label: impl Into<String>, script: MockScript) {
            self.scripts.lock().unwrap().insert(label.into(), script);
        }

        /// Make `verify` report the executable as missing for this label
        pub fn missing_executable(&self, label: impl Into<String>) {
            self.unlaunchable.lock().unwrap().insert(label.into());
        }

        pub fn stats(&self) -> Arc<MockStats> {
            Arc::clone(&self.stats)
        }
    }

    impl ProcessLauncher for MockLauncher {
        fn verify(&self, job: &ExternalJob) -> Result<(), ProcessError> {
            if self.unlaunchable.lock().unwrap().contains(job.label()) {
                return Err(ProcessError::NotFound(job.executable().to_path_buf()));
            }
            Ok(())
        }

        fn spawn(&self, job: &ExternalJob) -> Result<Box<dyn RunningProcess>, ProcessError> {
            let script = self
                .scripts
                .lock()
                .unwrap()
                .get(job.label())
                .cloned()
                .unwrap_or_else(|| self.default_script.clone());

            self.stats.on_launch(job.label());
            Ok(Box::new(MockProcess {
                label: job.label().to_string(),
                artifact_path: job.artifact().to_path_buf(),
                remaining_polls: script.polls,
                script,
                exited: None,
                stats: Arc::clone(&self.stats),
            }))
        }
    }

    struct MockProcess {
        label: String,
        artifact_path: PathBuf,
        remaining_polls: usize,
        script: MockScript,
        exited: Option<ProcessExit>,
        stats: Arc<MockStats>,
    }

    #[async_trait]
    impl RunningProcess for MockProcess {
        fn pid(&self) -> Option<u32> {
            None
        }

        fn try_exit(&mut self) -> Result<Option<ProcessExit>, ProcessError> {
            if let Some(exit) = self.exited {
                return Ok(Some(exit));
            }
            if self.remaining_polls > 0 {
                self.remaining_polls -= 1;
                return Ok(None);
            }
            if let Some(content) = &self.script.artifact {
                std::fs::write(&self.artifact_path, content)
                    .map_err(|e| ProcessError::ProbeFailed(e.to_string()))?;
            }
            let exit = ProcessExit::code(self.script.exit_code);
            self.exited = Some(exit);
            self.stats.on_exit(&self.label);
            Ok(Some(exit))
        }

        async fn wait_exit(&mut self) -> Result<ProcessExit, ProcessError> {
            loop {
                if let Some(exit) = self.try_exit()? {
                    return Ok(exit);
                }
                tokio::task::yield_now().await;
            }
        }
    }
}
