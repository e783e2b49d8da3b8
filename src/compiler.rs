//! Parameter compilation: matching submitted test data against a parameter
//! group's catalogue, then turning compiled entries into stored results.
//!
//! This is the one place that enforces the shape contract between catalogue
//! and submission: formula parameters take a variable map, direct parameters
//! take a bare value.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::formula::{format_value, FormulaError, FormulaEvaluator};
use crate::models::enums::ParameterKind;
use crate::models::{Parameter, TestResult};
use crate::test_data::TestDataEntry;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("Parameter {0} is not part of this parameter set")]
    UnknownParameter(Uuid),

    #[error("Parameter {parameter} {}", shape_message(.expected))]
    ShapeMismatch {
        parameter: Uuid,
        expected: ParameterKind,
    },

    #[error("Unknown variable '{variable}' for parameter {parameter}")]
    UnknownVariable { parameter: Uuid, variable: String },

    #[error("Variable '{variable}' of parameter {parameter} is not a number: '{value}'")]
    NonNumericVariable {
        parameter: Uuid,
        variable: String,
        value: String,
    },
}

fn shape_message(expected: &ParameterKind) -> &'static str {
    match expected {
        ParameterKind::Direct => "expects a direct value but got variable data",
        ParameterKind::Formula => "expects variable data but got a direct value",
    }
}

/// A submission entry bound to its catalogue definition.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledEntry {
    Direct {
        parameter_id: Uuid,
        value: String,
    },
    Formula {
        parameter_id: Uuid,
        formula: String,
        variables: BTreeMap<String, f64>,
    },
}

impl CompiledEntry {
    pub fn parameter_id(&self) -> Uuid {
        match self {
            Self::Direct { parameter_id, .. } | Self::Formula { parameter_id, .. } => *parameter_id,
        }
    }
}

/// Bind every entry to its parameter in `catalogue`. Fails on the first mismatch.
pub fn compile_test_data(
    entries: &[TestDataEntry],
    catalogue: &[Parameter],
) -> Result<Vec<CompiledEntry>, CompileError> {
    let by_id: HashMap<Uuid, &Parameter> = catalogue.iter().map(|p| (p.id, p)).collect();

    let compiled = entries
        .iter()
        .map(|entry| {
            let parameter = by_id
                .get(&entry.parameter())
                .copied()
                .ok_or(CompileError::UnknownParameter(entry.parameter()))?;
            compile_entry(entry, parameter)
        })
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(entries = compiled.len(), "Compiled test data");
    Ok(compiled)
}

fn compile_entry(entry: &TestDataEntry, parameter: &Parameter) -> Result<CompiledEntry, CompileError> {
    match (entry, &parameter.formula) {
        (TestDataEntry::Variables { data, .. }, Some(formula)) => {
            let mut variables = BTreeMap::new();
            for (name, raw) in data {
                if !parameter.declares_variable(name) {
                    return Err(CompileError::UnknownVariable {
                        parameter: parameter.id,
                        variable: name.clone(),
                    });
                }
                let value = parse_number(raw).ok_or_else(|| CompileError::NonNumericVariable {
                    parameter: parameter.id,
                    variable: name.clone(),
                    value: raw.clone(),
                })?;
                variables.insert(name.clone(), value);
            }
            Ok(CompiledEntry::Formula {
                parameter_id: parameter.id,
                formula: formula.clone(),
                variables,
            })
        }
        (TestDataEntry::Value { value, .. }, None) => Ok(CompiledEntry::Direct {
            parameter_id: parameter.id,
            value: value.clone(),
        }),
        (_, _) => Err(CompileError::ShapeMismatch {
            parameter: parameter.id,
            expected: parameter.kind(),
        }),
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// A formula that failed to evaluate, tagged with its parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaFailure {
    pub parameter_id: Uuid,
    pub error: FormulaError,
}

impl fmt::Display for FormulaFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parameter {}: {}", self.parameter_id, self.error)
    }
}

/// Every formula failure of one submission.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Formula evaluation failed for {}", join_failures(.failures))]
pub struct ComputationError {
    pub failures: Vec<FormulaFailure>,
}

fn join_failures(failures: &[FormulaFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Produce stored results. Direct values pass through untouched; formulas are
/// evaluated and rendered with `format_value`. All failures are collected so
/// the caller can report every bad parameter at once.
pub fn evaluate_entries<E: FormulaEvaluator + ?Sized>(
    entries: &[CompiledEntry],
    evaluator: &E,
) -> Result<Vec<TestResult>, ComputationError> {
    let mut results = Vec::with_capacity(entries.len());
    let mut failures = Vec::new();

    for entry in entries {
        match entry {
            CompiledEntry::Direct { parameter_id, value } => results.push(TestResult {
                parameter_id: *parameter_id,
                value: value.clone(),
            }),
            CompiledEntry::Formula { parameter_id, formula, variables } => {
                match evaluator.evaluate(formula, variables) {
                    Ok(v) => results.push(TestResult {
                        parameter_id: *parameter_id,
                        value: format_value(v),
                    }),
                    Err(error) => failures.push(FormulaFailure {
                        parameter_id: *parameter_id,
                        error,
                    }),
                }
            }
        }
    }

    if failures.is_empty() {
        Ok(results)
    } else {
        Err(ComputationError { failures })
    }
}
