use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ParameterKind;

/// A catalogue entry: one measurable quantity of a sample type.
///
/// `formula` is present iff `variables` is non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub id: Uuid,
    pub name: String,
    pub sample_type_id: Uuid,
    pub unit: String,
    pub test_method: String,
    pub variables: Vec<String>,
    pub formula: Option<String>,
}

impl Parameter {
    pub fn kind(&self) -> ParameterKind {
        if self.formula.is_some() {
            ParameterKind::Formula
        } else {
            ParameterKind::Direct
        }
    }

    pub fn declares_variable(&self, name: &str) -> bool {
        self.variables.iter().any(|v| v == name)
    }
}

/// A named group of parameters that is attached to samples and reported as one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSet {
    pub id: Uuid,
    pub name: String,
    pub sample_type_id: Uuid,
    pub parameters: Vec<Uuid>,
    pub is_partial: bool,
}
