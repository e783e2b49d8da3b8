//! Boundary validation of submitted test data.
//!
//! Report submissions arrive as untyped JSON. Each entry names a parameter
//! and carries either a direct `value` or a `data` map of variable values:
//!
//! ```json
//! [
//!   { "parameter": "<uuid>", "value": "7.2" },
//!   { "parameter": "<uuid>", "data": { "titre": "12.5", "weight": "5" } }
//! ]
//! ```
//!
//! `validate_test_data` resolves that shape once into `TestDataEntry`; nothing
//! downstream looks at the raw JSON again.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TestDataError {
    #[error("Malformed test data at entry {index}: {reason}")]
    Malformed { index: usize, reason: String },

    #[error("No test data submitted")]
    Empty,

    #[error("Parameter {0} appears more than once in the submission")]
    DuplicateParameter(Uuid),
}

/// One submitted measurement, shape already checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TestDataEntry {
    Value { parameter: Uuid, value: String },
    Variables { parameter: Uuid, data: BTreeMap<String, String> },
}

impl TestDataEntry {
    pub fn parameter(&self) -> Uuid {
        match self {
            Self::Value { parameter, .. } | Self::Variables { parameter, .. } => *parameter,
        }
    }
}

fn malformed(index: usize, reason: impl Into<String>) -> TestDataError {
    TestDataError::Malformed { index, reason: reason.into() }
}

/// Classify every entry, failing on the first structurally invalid one.
pub fn validate_test_data(entries: &[Value]) -> Result<Vec<TestDataEntry>, TestDataError> {
    if entries.is_empty() {
        return Err(TestDataError::Empty);
    }

    let mut seen = HashSet::new();
    let mut validated = Vec::with_capacity(entries.len());

    for (index, raw) in entries.iter().enumerate() {
        let entry = validate_entry(index, raw)?;
        if !seen.insert(entry.parameter()) {
            return Err(TestDataError::DuplicateParameter(entry.parameter()));
        }
        validated.push(entry);
    }

    Ok(validated)
}

fn validate_entry(index: usize, raw: &Value) -> Result<TestDataEntry, TestDataError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| malformed(index, "entry is not an object"))?;

    let parameter = match obj.get("parameter") {
        Some(Value::String(s)) => Uuid::parse_str(s.trim())
            .map_err(|_| malformed(index, format!("'{s}' is not a valid parameter id")))?,
        Some(_) => return Err(malformed(index, "'parameter' must be a string")),
        None => return Err(malformed(index, "missing 'parameter'")),
    };

    let value = match obj.get("value") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::String(_)) => return Err(malformed(index, "'value' is empty")),
        Some(_) => return Err(malformed(index, "'value' must be a string")),
    };

    let data = match obj.get("data") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => {
            let mut vars = BTreeMap::new();
            for (name, v) in map {
                match v {
                    Value::String(s) => {
                        vars.insert(name.clone(), s.clone());
                    }
                    _ => {
                        return Err(malformed(
                            index,
                            format!("variable '{name}' must be given as a string"),
                        ))
                    }
                }
            }
            Some(vars)
        }
        Some(Value::Array(_)) => return Err(malformed(index, "'data' must be a map, not an array")),
        Some(_) => return Err(malformed(index, "'data' must be a map")),
    };

    match (value, data) {
        (Some(value), None) => Ok(TestDataEntry::Value { parameter, value }),
        (None, Some(data)) => Ok(TestDataEntry::Variables { parameter, data }),
        (Some(_), Some(_)) => Err(malformed(index, "entry has both 'value' and 'data'")),
        (None, None) => Err(malformed(index, "entry has neither 'value' nor 'data'")),
    }
}
