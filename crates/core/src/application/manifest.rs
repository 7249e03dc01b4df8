// Batch Manifest - JSON description of a calibration batch

use crate::catalog::CalibratorCatalog;
use crate::config::{SchedulerConfig, ToolchainConfig};
use crate::domain::Calibrator;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// One job of a batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub calibrator: String,

    #[serde(default)]
    pub label: Option<String>,

    /// Scalar values (strings, numbers or booleans)
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,

    #[serde(default)]
    pub switches: Vec<String>,

    #[serde(default)]
    pub lists: BTreeMap<String, Vec<Value>>,

    #[serde(default)]
    pub output_prefix: Option<String>,

    #[serde(default)]
    pub keep_artifact: Option<bool>,
}

/// A batch file: extra calibrator records, the jobs and scheduler knobs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchManifest {
    #[serde(default)]
    pub calibrators: Vec<crate::domain::CalibratorSpec>,

    pub jobs: Vec<JobRequest>,

    #[serde(default)]
    pub max_concurrency: Option<usize>,

    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
}

impl BatchManifest {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let manifest = Self::from_json(&text)?;
        debug!(
            path = %path.display(),
            jobs = manifest.jobs.len(),
            inline_calibrators = manifest.calibrators.len(),
            "Batch manifest loaded"
        );
        Ok(manifest)
    }

    /// Reject manifests that cannot describe a meaningful batch
    pub fn validate(&self) -> Result<()> {
        if self.jobs.is_empty() {
            return Err(AppError::Validation("manifest lists no jobs".to_string()));
        }

        let mut labels = HashSet::new();
        for (index, job) in self.jobs.iter().enumerate() {
            if job.calibrator.trim().is_empty() {
                return Err(AppError::Validation(format!(
                    "job #{} has no calibrator",
                    index + 1
                )));
            }
            if let Some(label) = &job.label {
                if !labels.insert(label.as_str()) {
                    return Err(AppError::Validation(format!("duplicate job label '{}'", label)));
                }
            }
        }
        Ok(())
    }

    /// Scheduler settings: explicit overrides first, then the manifest, then defaults
    pub fn scheduler_config(
        &self,
        max_concurrency: Option<usize>,
        poll_interval_ms: Option<u64>,
    ) -> Result<SchedulerConfig> {
        let defaults = SchedulerConfig::default();
        SchedulerConfig::new(
            max_concurrency
                .or(self.max_concurrency)
                .unwrap_or(defaults.max_concurrency()),
            poll_interval_ms
                .or(self.poll_interval_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval()),
        )
    }

    /// Catalog extended with the manifest's inline records
    pub fn catalog(&self, base: CalibratorCatalog) -> Result<CalibratorCatalog> {
        let mut catalog = base;
        for spec in &self.calibrators {
            catalog.register(spec.clone())?;
        }
        Ok(catalog)
    }

    /// Build one configured calibrator per job, in manifest order
    ///
    /// # Errors
    /// - AppError::Validation for an invalid manifest, a non-scalar value, or two
    ///   jobs sharing a label or artifact path
    /// - AppError::Domain for unknown calibrators or parameters
    /// - AppError::Config if an executable cannot be located
    pub fn calibrators(
        &self,
        base: CalibratorCatalog,
        toolchain: &ToolchainConfig,
    ) -> Result<Vec<Calibrator>> {
        self.validate()?;
        let catalog = self.catalog(base)?;
        let calibrators = self
            .jobs
            .iter()
            .map(|job| job.configure(&catalog, toolchain))
            .collect::<Result<Vec<_>>>()?;
        ensure_distinct(&calibrators)?;
        Ok(calibrators)
    }
}

/// Effective labels and artifact paths must not collide once defaults apply
fn ensure_distinct(calibrators: &[Calibrator]) -> Result<()> {
    let mut labels = HashSet::new();
    let mut artifacts = HashSet::new();
    for calibrator in calibrators {
        if !labels.insert(calibrator.label()) {
            return Err(AppError::Validation(format!(
                "duplicate job label '{}'; give each job its own label",
                calibrator.label()
            )));
        }
        let artifact = calibrator.artifact_path();
        if !artifacts.insert(artifact.clone()) {
            return Err(AppError::Validation(format!(
                "job '{}' writes to {}, already used by another job; set output_prefix",
                calibrator.label(),
                artifact.display()
            )));
        }
    }
    Ok(())
}

impl JobRequest {
    pub fn new(calibrator: impl Into<String>) -> Self {
        Self {
            calibrator: calibrator.into(),
            ..Self::default()
        }
    }

    /// Apply this request to a fresh calibrator from the catalog
    pub fn configure(
        &self,
        catalog: &CalibratorCatalog,
        toolchain: &ToolchainConfig,
    ) -> Result<Calibrator> {
        let mut calibrator = catalog.calibrator(&self.calibrator, toolchain)?;

        if let Some(label) = &self.label {
            calibrator.set_label(label);
        }
        for (name, value) in &self.parameters {
            calibrator.set(name, scalar(name, value)?)?;
        }
        for name in &self.switches {
            calibrator.enable(name, true)?;
        }
        for (name, items) in &self.lists {
            let items = items
                .iter()
                .map(|v| scalar(name, v))
                .collect::<Result<Vec<_>>>()?;
            calibrator.set_list(name, &items)?;
        }
        if let Some(prefix) = &self.output_prefix {
            calibrator.set_output_prefix(prefix);
        }
        if let Some(keep) = self.keep_artifact {
            calibrator.set_keep_artifact(keep);
        }
        Ok(calibrator)
    }
}

fn scalar(name: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(AppError::Validation(format!(
            "parameter '{}' must be a string, number or boolean",
            name
        ))),
    }
}
