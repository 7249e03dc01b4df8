// Job Outcome - terminal record of one job's execution

use super::error::ExtractionError;
use super::job::JobId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Values read from an artifact, keyed by field name
pub type ExtractedValues = BTreeMap<String, f64>;

/// Why a job did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Executable not found, not executable, or spawn refused
    LaunchFailure { reason: String },
    /// Non-zero exit (code is None when terminated by a signal)
    ExitFailure { code: Option<i32> },
    /// Zero exit, but the artifact was not there
    ArtifactMissing { path: String },
    /// Zero exit, but a declared coordinate could not be read
    MalformedOutput { reason: String },
    /// Zero exit, but the artifact exists and could not be read
    ArtifactUnreadable { path: String, reason: String },
}

impl FailureKind {
    pub fn name(&self) -> &'static str {
        match self {
            FailureKind::LaunchFailure { .. } => "LAUNCH_FAILURE",
            FailureKind::ExitFailure { .. } => "EXIT_FAILURE",
            FailureKind::ArtifactMissing { .. } => "ARTIFACT_MISSING",
            FailureKind::MalformedOutput { .. } => "MALFORMED_OUTPUT",
            FailureKind::ArtifactUnreadable { .. } => "ARTIFACT_UNREADABLE",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::LaunchFailure { reason } => write!(f, "launch failure: {}", reason),
            FailureKind::ExitFailure { code: Some(code) } => {
                write!(f, "process exited with status {}", code)
            }
            FailureKind::ExitFailure { code: None } => {
                write!(f, "process terminated without exit code")
            }
            FailureKind::ArtifactMissing { path } => write!(f, "artifact missing: {}", path),
            FailureKind::MalformedOutput { reason } => write!(f, "malformed output: {}", reason),
            FailureKind::ArtifactUnreadable { path, reason } => {
                write!(f, "I/O error reading artifact {}: {}", path, reason)
            }
        }
    }
}

impl From<&ExtractionError> for FailureKind {
    fn from(err: &ExtractionError) -> Self {
        match err {
            ExtractionError::ArtifactMissing { path } => FailureKind::ArtifactMissing {
                path: path.display().to_string(),
            },
            ExtractionError::MalformedOutput { .. } => FailureKind::MalformedOutput {
                reason: err.to_string(),
            },
            ExtractionError::Io { path, source } => FailureKind::ArtifactUnreadable {
                path: path.display().to_string(),
                reason: source.to_string(),
            },
        }
    }
}

/// Terminal record of one job.
///
/// `succeeded` is true only when the process exited 0 AND extraction
/// produced every declared field. `values` is empty on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub label: String,
    pub exit_code: Option<i32>,
    pub succeeded: bool,
    pub values: ExtractedValues,
    pub failure: Option<FailureKind>,
    pub duration_ms: i64,
}

impl JobOutcome {
    pub fn success(
        job_id: impl Into<String>,
        label: impl Into<String>,
        values: ExtractedValues,
        duration_ms: i64,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            label: label.into(),
            exit_code: Some(0),
            succeeded: true,
            values,
            failure: None,
            duration_ms,
        }
    }

    pub fn failure(
        job_id: impl Into<String>,
        label: impl Into<String>,
        exit_code: Option<i32>,
        kind: FailureKind,
        duration_ms: i64,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            label: label.into(),
            exit_code,
            succeeded: false,
            values: ExtractedValues::new(),
            failure: Some(kind),
            duration_ms,
        }
    }

    pub fn value(&self, field: &str) -> Option<f64> {
        self.values.get(field).copied()
    }
}
