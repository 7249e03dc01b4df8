// Port Layer - Interfaces for external dependencies

pub mod id_provider; // For deterministic testing
pub mod process_launcher;
pub mod time_provider;

// Re-exports
pub use id_provider::{IdProvider, UuidProvider};
pub use process_launcher::{ProcessError, ProcessExit, ProcessLauncher, RunningProcess};
pub use time_provider::{SystemTimeProvider, TimeProvider};
