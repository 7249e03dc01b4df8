// External Job Domain Model

use super::schema::ResultSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Job ID (UUID v4 in production, deterministic in tests)
pub type JobId = String;

/// One command-line argument: a flag with an optional value.
///
/// A flag without a value is a boolean switch. Positional tokens (such as a
/// steering file) are modelled as a flag with no value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    pub flag: String,
    pub value: Option<String>,
}

impl Argument {
    pub fn valued(flag: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            flag: flag.into(),
            value: Some(value.into()),
        }
    }

    pub fn switch(flag: impl Into<String>) -> Self {
        Self {
            flag: flag.into(),
            value: None,
        }
    }
}

/// Immutable description of one unit of external work.
///
/// Fields are private: once built, a job is only read. The runner and the
/// scheduler take it by value or by shared reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalJob {
    id: JobId,
    label: String,
    executable: PathBuf,
    arguments: Vec<Argument>,
    artifact: PathBuf,
    delete_artifact_on_completion: bool,
    schema: ResultSchema,
}

impl ExternalJob {
    /// Create a new job
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `label` - Human-readable name used in logs and reports
    /// * `executable` - Path of the binary to launch
    /// * `artifact` - File the binary is expected to write
    /// * `schema` - Coordinates to read from the artifact on success
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        executable: impl Into<PathBuf>,
        artifact: impl Into<PathBuf>,
        schema: ResultSchema,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            executable: executable.into(),
            arguments: Vec::new(),
            artifact: artifact.into(),
            delete_artifact_on_completion: true,
            schema,
        }
    }

    /// Append an argument (construction-time only, consumes self)
    pub fn with_argument(mut self, argument: Argument) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn with_arguments(mut self, arguments: impl IntoIterator<Item = Argument>) -> Self {
        self.arguments.extend(arguments);
        self
    }

    pub fn keep_artifact(mut self, keep: bool) -> Self {
        self.delete_artifact_on_completion = !keep;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    pub fn deletes_artifact(&self) -> bool {
        self.delete_artifact_on_completion
    }

    pub fn schema(&self) -> &ResultSchema {
        &self.schema
    }

    /// Flatten arguments into the token list passed to the process
    ///
    /// Each argument contributes its flag, followed by its value when present.
    pub fn command_args(&self) -> Vec<String> {
        let mut tokens = Vec::with_capacity(self.arguments.len() * 2);
        for arg in &self.arguments {
            tokens.push(arg.flag.clone());
            if let Some(value) = &arg.value {
                tokens.push(value.clone());
            }
        }
        tokens
    }

    /// Full command line as a single string (for logging only)
    pub fn command_line(&self) -> String {
        let mut line = self.executable.display().to_string();
        for token in self.command_args() {
            line.push(' ');
            line.push_str(&token);
        }
        line
    }
}

impl fmt::Display for ExternalJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.id)
    }
}
