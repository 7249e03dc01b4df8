// Application Layer - Use Cases and Business Logic

pub mod calibration;
pub mod constants;
pub mod extractor;
pub mod manifest;
pub mod runner;
pub mod scheduler;
pub mod shutdown;

// Re-exports
pub use calibration::{CalibrationBatch, CalibrationService};
pub use extractor::extract_values;
pub use manifest::{BatchManifest, JobRequest};
pub use runner::JobRunner;
pub use scheduler::{BatchReport, BoundedScheduler, SchedulerState, StateCounts, UnlaunchedJob};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
