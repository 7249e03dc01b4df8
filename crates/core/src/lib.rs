// Calib Core - Domain Logic & Ports
// NO infrastructure dependencies: processes are launched through port::ProcessLauncher

pub mod application;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod port;

pub use catalog::CalibratorCatalog;
pub use config::{SchedulerConfig, ToolchainConfig};
pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
