// Calibrator Variants - per-binary configuration records
//
// A calibrator is data, not behavior: which binary to run, which flags it
// takes, where it writes its report, and which coordinates to read back.
// One generic Calibrator instance turns a record plus parameter values into
// an ExternalJob, and turns a JobOutcome into named physical quantities.

use super::error::{DomainError, Result};
use super::job::{Argument, ExternalJob, JobId};
use super::outcome::{ExtractedValues, JobOutcome};
use super::schema::ResultSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;

/// Default artifact file name appended to the output prefix
pub const DEFAULT_ARTIFACT_SUFFIX: &str = "Calibration.txt";

/// Separator used when a list parameter is flattened to one token
pub const LIST_SEPARATOR: &str = ":";

/// How the binary is located on this host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutableLocation {
    /// `<analysis install root>/bin/<binary>`
    InstallRoot { binary: String },
    /// First match of `<binary>` on the search path
    SearchPath { binary: String },
    /// Used as given
    Absolute { path: PathBuf },
}

impl ExecutableLocation {
    pub fn binary_name(&self) -> String {
        match self {
            ExecutableLocation::InstallRoot { binary } | ExecutableLocation::SearchPath { binary } => {
                binary.clone()
            }
            ExecutableLocation::Absolute { path } => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    /// `flag value`
    #[default]
    Value,
    /// `flag` alone when enabled
    Switch,
    /// `flag v1:v2:...`
    List,
    /// bare `value`, no flag
    Positional,
}

/// One parameter a binary accepts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(default)]
    pub flag: Option<String>,
    #[serde(default)]
    pub kind: ParameterKind,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub doc: String,
}

impl ParameterSpec {
    pub fn value(name: &str, flag: &str, doc: &str) -> Self {
        Self {
            name: name.to_string(),
            flag: Some(flag.to_string()),
            kind: ParameterKind::Value,
            default: None,
            required: false,
            doc: doc.to_string(),
        }
    }

    pub fn switch(name: &str, flag: &str, doc: &str) -> Self {
        Self {
            kind: ParameterKind::Switch,
            ..Self::value(name, flag, doc)
        }
    }

    pub fn list(name: &str, flag: &str, doc: &str) -> Self {
        Self {
            kind: ParameterKind::List,
            ..Self::value(name, flag, doc)
        }
    }

    pub fn positional(name: &str, doc: &str) -> Self {
        Self {
            name: name.to_string(),
            flag: None,
            kind: ParameterKind::Positional,
            default: None,
            required: false,
            doc: doc.to_string(),
        }
    }

    pub fn with_default(mut self, default: impl ToString) -> Self {
        self.default = Some(default.to_string());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// How the output location is handed to the binary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputPassing {
    /// `<flag> <prefix>` as two tokens; the binary appends the suffix
    #[default]
    Prefix,
    /// One `<flag><prefix><suffix>` token, e.g. `--MyPfoAnalysis.RootFile=out.root`
    InlinePath,
}

/// Where the binary writes its report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    /// Flag that receives the location; None when the binary picks its own path
    #[serde(default)]
    pub flag: Option<String>,
    #[serde(default)]
    pub passing: OutputPassing,
    pub default_prefix: String,
    #[serde(default = "default_suffix")]
    pub suffix: String,
    /// Keep the artifact after extraction unless told otherwise
    #[serde(default)]
    pub keep: bool,
}

fn default_suffix() -> String {
    DEFAULT_ARTIFACT_SUFFIX.to_string()
}

/// Ordered group of fields exposed as one vector (e.g. per-bin weights)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesSpec {
    pub name: String,
    pub fields: Vec<String>,
}

/// Configuration record for one external binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratorSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub executable: ExecutableLocation,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    pub output: OutputSpec,
    #[serde(default)]
    pub schema: ResultSchema,
    #[serde(default)]
    pub series: Vec<SeriesSpec>,
}

impl CalibratorSpec {
    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Check internal consistency of a record (used for manifest-declared ones)
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "calibrator name cannot be empty".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for param in &self.parameters {
            if !names.insert(param.name.as_str()) {
                return Err(DomainError::ValidationError(format!(
                    "{}: duplicate parameter '{}'",
                    self.name, param.name
                )));
            }
            let needs_flag = param.kind != ParameterKind::Positional;
            if needs_flag && param.flag.as_deref().map_or(true, str::is_empty) {
                return Err(DomainError::ValidationError(format!(
                    "{}: parameter '{}' needs a flag",
                    self.name, param.name
                )));
            }
        }

        let fields: HashSet<&str> = self.schema.field_names().collect();
        for series in &self.series {
            if let Some(missing) = series.fields.iter().find(|f| !fields.contains(f.as_str())) {
                return Err(DomainError::ValidationError(format!(
                    "{}: series '{}' references unknown field '{}'",
                    self.name, series.name, missing
                )));
            }
        }
        Ok(())
    }
}

/// A calibrator record bound to a resolved executable and parameter values
#[derive(Debug, Clone)]
pub struct Calibrator {
    spec: CalibratorSpec,
    executable: PathBuf,
    label: Option<String>,
    values: BTreeMap<String, String>,
    switches: BTreeSet<String>,
    output_prefix: String,
    keep_artifact: bool,
}

impl Calibrator {
    pub fn new(spec: CalibratorSpec, executable: impl Into<PathBuf>) -> Self {
        let output_prefix = spec.output.default_prefix.clone();
        let keep_artifact = spec.output.keep;
        Self {
            spec,
            executable: executable.into(),
            label: None,
            values: BTreeMap::new(),
            switches: BTreeSet::new(),
            output_prefix,
            keep_artifact,
        }
    }

    pub fn spec(&self) -> &CalibratorSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn executable(&self) -> &std::path::Path {
        &self.executable
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.spec.name)
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = Some(label.into());
    }

    fn lookup(&self, name: &str) -> Result<&ParameterSpec> {
        self.spec
            .parameter(name)
            .ok_or_else(|| DomainError::UnknownParameter {
                calibrator: self.spec.name.clone(),
                parameter: name.to_string(),
            })
    }

    /// Set a valued, list or positional parameter
    ///
    /// A list parameter also accepts an already-joined string.
    pub fn set(&mut self, name: &str, value: impl ToString) -> Result<()> {
        let param = self.lookup(name)?;
        if param.kind == ParameterKind::Switch {
            return Err(DomainError::ValidationError(format!(
                "{}: '{}' is a switch, use enable()",
                self.spec.name, name
            )));
        }
        self.values.insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Set a list parameter from its items
    pub fn set_list<T: ToString>(&mut self, name: &str, items: &[T]) -> Result<()> {
        let param = self.lookup(name)?;
        if param.kind != ParameterKind::List {
            return Err(DomainError::ValidationError(format!(
                "{}: '{}' is not a list parameter",
                self.spec.name, name
            )));
        }
        let joined = items
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(LIST_SEPARATOR);
        self.values.insert(name.to_string(), joined);
        Ok(())
    }

    /// Turn a boolean switch on or off
    pub fn enable(&mut self, name: &str, on: bool) -> Result<()> {
        let param = self.lookup(name)?;
        if param.kind != ParameterKind::Switch {
            return Err(DomainError::ValidationError(format!(
                "{}: '{}' is not a switch",
                self.spec.name, name
            )));
        }
        if on {
            self.switches.insert(name.to_string());
        } else {
            self.switches.remove(name);
        }
        Ok(())
    }

    pub fn set_output_prefix(&mut self, prefix: impl Into<String>) {
        self.output_prefix = prefix.into();
    }

    pub fn set_keep_artifact(&mut self, keep: bool) {
        self.keep_artifact = keep;
    }

    pub fn artifact_path(&self) -> PathBuf {
        PathBuf::from(format!("{}{}", self.output_prefix, self.spec.output.suffix))
    }

    /// Current value of a parameter (explicit or default)
    pub fn value(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .map(String::as_str)
            .or_else(|| self.spec.parameter(name)?.default.as_deref())
    }

    /// Assemble arguments in declaration order, output flag last
    pub fn arguments(&self) -> Result<Vec<Argument>> {
        let mut args = Vec::new();
        for param in &self.spec.parameters {
            if param.kind == ParameterKind::Switch {
                if self.switches.contains(&param.name) {
                    args.push(Argument::switch(param.flag.clone().unwrap_or_default()));
                }
                continue;
            }

            let Some(value) = self.value(&param.name) else {
                if param.required {
                    return Err(DomainError::ValidationError(format!(
                        "{}: missing required parameter '{}'",
                        self.spec.name, param.name
                    )));
                }
                continue;
            };

            match (&param.kind, &param.flag) {
                (ParameterKind::Positional, _) | (_, None) => args.push(Argument::switch(value)),
                (_, Some(flag)) => args.push(Argument::valued(flag.clone(), value)),
            }
        }

        if let Some(flag) = &self.spec.output.flag {
            match self.spec.output.passing {
                OutputPassing::Prefix => {
                    args.push(Argument::valued(flag.clone(), self.output_prefix.clone()))
                }
                OutputPassing::InlinePath => args.push(Argument::switch(format!(
                    "{}{}",
                    flag,
                    self.artifact_path().display()
                ))),
            }
        }
        Ok(args)
    }

    /// Produce the immutable job for the current parameters
    pub fn build_job(&self, id: impl Into<JobId>) -> Result<ExternalJob> {
        let job = ExternalJob::new(
            id.into(),
            self.label(),
            self.executable.clone(),
            self.artifact_path(),
            self.spec.schema.clone(),
        )
        .with_arguments(self.arguments()?)
        .keep_artifact(self.keep_artifact);
        Ok(job)
    }

    /// Turn a successful outcome into named quantities
    ///
    /// Returns None for a failed outcome: failed runs carry no usable values.
    pub fn interpret(&self, outcome: &JobOutcome) -> Option<CalibrationResult> {
        if !outcome.succeeded {
            return None;
        }
        let series = self
            .spec
            .series
            .iter()
            .map(|s| {
                let values = s
                    .fields
                    .iter()
                    .filter_map(|f| outcome.values.get(f).copied())
                    .collect();
                (s.name.clone(), values)
            })
            .collect();

        Some(CalibrationResult {
            calibrator: self.spec.name.clone(),
            label: outcome.label.clone(),
            quantities: outcome.values.clone(),
            series,
        })
    }
}

/// Named physical quantities from one successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub calibrator: String,
    pub label: String,
    pub quantities: ExtractedValues,
    pub series: BTreeMap<String, Vec<f64>>,
}

impl CalibrationResult {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.quantities.get(name).copied()
    }

    pub fn series(&self, name: &str) -> Option<&[f64]> {
        self.series.get(name).map(Vec::as_slice)
    }
}
