// Domain Error Types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Unknown calibrator: {0}")]
    UnknownCalibrator(String),

    #[error("Unknown parameter '{parameter}' for calibrator {calibrator}")]
    UnknownParameter {
        calibrator: String,
        parameter: String,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;

/// Failures reading values out of a job's artifact
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Artifact missing: {}", path.display())]
    ArtifactMissing { path: PathBuf },

    #[error("Malformed output in {} (field '{field}'): {reason}", path.display())]
    MalformedOutput {
        path: PathBuf,
        field: String,
        reason: String,
    },

    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
