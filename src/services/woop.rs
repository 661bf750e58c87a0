//! WOOP Extraction
//!
//! Repairs raw generator output into the four-field WOOP record. The
//! upstream model may wrap the JSON object in markdown fences or prose, and
//! despite instructions sometimes emits `obstacle`/`plan` as arrays.
//!
//! Two phases: locate the outermost `{ ... }` span, then parse it and
//! coerce the fields. Failures come back as a typed `ExtractionError`;
//! readers substitute [`crate::services::llm::prompts::fallback_report`]
//! instead of surfacing corrupt data.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::report::WoopReport;

/// Placeholder for an absent obstacle/plan field, matching the shape the
/// fixed fallback record uses.
const EMPTY_LIST_FIELD: &str = "[]";

/// Why extraction failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtractionError {
    /// No balanced `{ ... }` span in the text.
    MissingJsonObject,
    /// The located span is not valid JSON.
    InvalidJson { message: String },
    /// A required key is absent.
    MissingField { field: String },
    /// A field has an uncoercible type.
    InvalidFieldType { field: String },
}

impl fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingJsonObject => write!(f, "no JSON object found in generated text"),
            Self::InvalidJson { message } => write!(f, "invalid JSON: {}", message),
            Self::MissingField { field } => write!(f, "missing required field: {}", field),
            Self::InvalidFieldType { field } => {
                write!(f, "field has invalid type: {}", field)
            }
        }
    }
}

impl std::error::Error for ExtractionError {}

/// Extract and repair a WOOP record from raw generated text.
pub fn extract_woop(raw: &str) -> Result<WoopReport, ExtractionError> {
    let start = raw.find('{').ok_or(ExtractionError::MissingJsonObject)?;
    let end = raw.rfind('}').ok_or(ExtractionError::MissingJsonObject)?;
    if end <= start {
        return Err(ExtractionError::MissingJsonObject);
    }

    let value: serde_json::Value =
        serde_json::from_str(&raw[start..=end]).map_err(|e| ExtractionError::InvalidJson {
            message: e.to_string(),
        })?;

    let object = value.as_object().ok_or(ExtractionError::MissingJsonObject)?;

    let wish = required_string(object, "wish")?;
    let outcome = required_string(object, "outcome")?;
    let obstacle = flattened_string(object, "obstacle")?;
    let plan = flattened_string(object, "plan")?;

    Ok(WoopReport {
        wish,
        outcome,
        obstacle,
        plan,
    })
}

/// A key that must be present as a string.
fn required_string(
    object: &serde_json::Map<String, serde_json::Value>,
    field: &str,
) -> Result<String, ExtractionError> {
    match object.get(field) {
        None => Err(ExtractionError::MissingField {
            field: field.to_string(),
        }),
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ExtractionError::InvalidFieldType {
            field: field.to_string(),
        }),
    }
}

/// A key that may be a string or a list; lists are joined with newlines,
/// absence becomes the empty-list placeholder.
fn flattened_string(
    object: &serde_json::Map<String, serde_json::Value>,
    field: &str,
) -> Result<String, ExtractionError> {
    match object.get(field) {
        None => Ok(EMPTY_LIST_FIELD.to_string()),
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(serde_json::Value::Array(items)) => {
            let parts: Vec<String> = items
                .iter()
                .map(|item| match item {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            Ok(parts.join("\n"))
        }
        Some(_) => Err(ExtractionError::InvalidFieldType {
            field: field.to_string(),
        }),
    }
}
