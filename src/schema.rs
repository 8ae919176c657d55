//! Schema Validator (spec.md §4.8): an optional JSON-Schema-subset gate
//! applied to successful provider outputs.
//!
//! Only `required` (object member presence) and the top-level `type` are
//! checked — a deliberately narrow subset (§4.8 names exactly these two
//! checks; a full JSON-Schema implementation would be an external
//! collaborator, not part of this core).

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "type", default)]
    pub schema_type: Option<String>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl Schema {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read schema {}", path.display()))?;
        let schema: Schema = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse schema {}", path.display()))?;
        Ok(schema)
    }

    /// Validates `output_text` as JSON against this schema, returning the
    /// validation errors (empty when valid).
    pub fn validate(&self, output_text: &str) -> Vec<String> {
        let mut errors = Vec::new();

        let value: serde_json::Value = match serde_json::from_str(output_text) {
            Ok(v) => v,
            Err(err) => {
                errors.push(format!("output is not valid JSON: {err}"));
                return errors;
            }
        };

        if let Some(expected_type) = &self.schema_type {
            if expected_type == "object" && !value.is_object() {
                errors.push("expected output to be a JSON object".to_string());
                return errors;
            }
        }

        if !self.required.is_empty() {
            let obj = value.as_object();
            for field in &self.required {
                let present = obj.is_some_and(|o| o.contains_key(field));
                if !present {
                    errors.push(format!("missing required field '{field}'"));
                }
            }
        }

        errors
    }
}

/// Validation failure message, pipe-separated per §4.8.
pub fn join_errors(errors: &[String]) -> String {
    errors.join("|")
}
