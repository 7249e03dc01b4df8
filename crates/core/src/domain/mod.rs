// Domain Layer - Pure business logic and entities

pub mod calibrator;
pub mod error;
pub mod job;
pub mod outcome;
pub mod schema;

// Re-exports
pub use calibrator::{
    CalibrationResult, Calibrator, CalibratorSpec, ExecutableLocation, OutputPassing, OutputSpec,
    ParameterKind, ParameterSpec, SeriesSpec,
};
pub use error::{DomainError, ExtractionError};
pub use job::{Argument, ExternalJob, JobId};
pub use outcome::{ExtractedValues, FailureKind, JobOutcome};
pub use schema::{FieldLocator, ResultSchema};
