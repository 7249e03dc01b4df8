// Calib Infrastructure - System Adapters
// Implements: ProcessLauncher

pub mod subprocess_launcher;

pub use subprocess_launcher::{ChildOutput, SubprocessLauncher};
