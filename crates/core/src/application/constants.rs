// Scheduler constants (no magic values)
use std::time::Duration;

/// Default number of jobs allowed to run at once
pub const DEFAULT_MAX_CONCURRENCY: usize = 3;

/// Default delay between termination probes (1s)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Lower bound for a configured poll interval (10ms)
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Environment variable naming the analysis binaries' install root
pub const ANALYSIS_ROOT_ENV: &str = "PANDORA_ANALYSIS_DIR";

/// Sub-directory of the install root holding the binaries
pub const ANALYSIS_BIN_DIR: &str = "bin";
