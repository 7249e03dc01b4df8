// Result Schema - (line, token) coordinates inside an artifact
//
// These coordinates are a contract with the external binary's report format.
// They are declared once per calibrator and never discovered at runtime.

use super::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Where one named quantity lives inside an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLocator {
    /// 1-based line number
    pub line: usize,
    /// 0-based whitespace-separated token index
    pub token: usize,
    pub name: String,
}

impl FieldLocator {
    pub fn new(line: usize, token: usize, name: impl Into<String>) -> Self {
        Self {
            line,
            token,
            name: name.into(),
        }
    }
}

/// Ordered, validated list of field locators
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<FieldLocator>", into = "Vec<FieldLocator>")]
pub struct ResultSchema {
    fields: Vec<FieldLocator>,
}

impl ResultSchema {
    /// Build a schema, rejecting line 0 and duplicate field names
    pub fn new(fields: Vec<FieldLocator>) -> Result<Self> {
        let mut seen = HashSet::new();
        for field in &fields {
            if field.line == 0 {
                return Err(DomainError::ValidationError(format!(
                    "field '{}': line numbers are 1-based",
                    field.name
                )));
            }
            if field.name.trim().is_empty() {
                return Err(DomainError::ValidationError(
                    "field name cannot be empty".to_string(),
                ));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(DomainError::ValidationError(format!(
                    "duplicate field name '{}'",
                    field.name
                )));
            }
        }
        Ok(Self { fields })
    }

    /// Schema with no fields (artifact existence is still checked)
    pub fn empty() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn fields(&self) -> &[FieldLocator] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Highest line the artifact must have
    pub fn max_line(&self) -> usize {
        self.fields.iter().map(|f| f.line).max().unwrap_or(0)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

impl TryFrom<Vec<FieldLocator>> for ResultSchema {
    type Error = DomainError;

    fn try_from(fields: Vec<FieldLocator>) -> Result<Self> {
        Self::new(fields)
    }
}

impl From<ResultSchema> for Vec<FieldLocator> {
    fn from(schema: ResultSchema) -> Self {
        schema.fields
    }
}
