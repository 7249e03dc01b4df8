//! Result Extractor - reads declared (line, token) coordinates from an artifact
//!
//! The external binaries write free-form reports; absolute line/token
//! positions are the only stable handle. All knowledge of that format stays
//! in this module and in the per-calibrator `ResultSchema`.

use crate::domain::{ExtractedValues, ExtractionError, FieldLocator, ResultSchema};
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// Extract every field of `schema` from the artifact at `path`
///
/// All-or-nothing: the first field that cannot be read fails the whole
/// extraction. An empty schema only checks that the artifact exists.
///
/// # Errors
/// - ExtractionError::ArtifactMissing if the file does not exist
/// - ExtractionError::MalformedOutput if a line or token is absent or not a finite number
/// - ExtractionError::Io if the file exists but cannot be read
pub fn extract_values(
    path: &Path,
    schema: &ResultSchema,
) -> Result<ExtractedValues, ExtractionError> {
    if schema.is_empty() {
        return match std::fs::metadata(path) {
            Ok(_) => Ok(ExtractedValues::new()),
            Err(e) => Err(io_error(path, e)),
        };
    }

    let bytes = std::fs::read(path).map_err(|e| io_error(path, e))?;
    let content = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = content.lines().collect();

    let mut values = ExtractedValues::new();
    for field in schema.fields() {
        let value = read_field(&lines, field).map_err(|reason| ExtractionError::MalformedOutput {
            path: path.to_path_buf(),
            field: field.name.clone(),
            reason,
        })?;
        values.insert(field.name.clone(), value);
    }

    debug!(
        artifact = %path.display(),
        fields = values.len(),
        "Extracted artifact values"
    );
    Ok(values)
}

fn read_field(lines: &[&str], field: &FieldLocator) -> Result<f64, String> {
    let line = lines.get(field.line - 1).ok_or_else(|| {
        format!(
            "artifact has {} lines, line {} required",
            lines.len(),
            field.line
        )
    })?;

    let token = line.split_whitespace().nth(field.token).ok_or_else(|| {
        format!(
            "line {} has {} tokens, token {} required",
            field.line,
            line.split_whitespace().count(),
            field.token
        )
    })?;

    let value: f64 = token
        .parse()
        .map_err(|_| format!("token '{}' at line {} is not numeric", token, field.line))?;

    if !value.is_finite() {
        return Err(format!(
            "token '{}' at line {} is not a finite number",
            token, field.line
        ));
    }
    Ok(value)
}

fn io_error(path: &Path, err: std::io::Error) -> ExtractionError {
    if err.kind() == ErrorKind::NotFound {
        ExtractionError::ArtifactMissing {
            path: path.to_path_buf(),
        }
    } else {
        ExtractionError::Io {
            path: path.to_path_buf(),
            source: err,
        }
    }
}
