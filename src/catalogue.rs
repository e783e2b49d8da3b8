//! Reference catalogue: sample types, parameters and parameter sets.
//!
//! Only creation is offered. Whatever is created here is guaranteed to hold
//! the invariants the lifecycle relies on: a parameter has a formula iff it
//! declares variables, the formula parses and only references those
//! variables, and a set only groups parameters of its own sample type.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use rusqlite::Connection;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::db::repository;
use crate::error::LabError;
use crate::formula::{self, FormulaError};
use crate::models::{Parameter, ParameterSet, SampleType};

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogueError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("'{0}' is not a valid variable name")]
    InvalidVariableName(String),

    #[error("Variable '{0}' is declared twice")]
    DuplicateVariable(String),

    #[error("A formula parameter must declare its variables")]
    FormulaWithoutVariables,

    #[error("Variables were declared but no formula uses them")]
    VariablesWithoutFormula,

    #[error("Invalid formula: {0}")]
    Formula(#[from] FormulaError),

    #[error("A parameter set needs at least one parameter")]
    EmptyParameterSet,

    #[error("Parameter {0} is listed twice")]
    DuplicateMember(Uuid),

    #[error("Parameters do not exist: {0:?}")]
    UnknownParameters(Vec<Uuid>),

    #[error("Parameters belong to a different sample type: {0:?}")]
    ForeignParameters(Vec<Uuid>),
}

impl CatalogueError {
    pub fn offending_ids(&self) -> Vec<Uuid> {
        match self {
            Self::DuplicateMember(id) => vec![*id],
            Self::UnknownParameters(ids) | Self::ForeignParameters(ids) => ids.clone(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewParameter {
    pub name: String,
    pub sample_type_id: Uuid,
    pub unit: String,
    pub test_method: String,
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default)]
    pub formula: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewParameterSet {
    pub name: String,
    pub sample_type_id: Uuid,
    pub parameters: Vec<Uuid>,
    #[serde(default)]
    pub is_partial: bool,
}

fn required(field: &'static str, value: &str) -> Result<String, CatalogueError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CatalogueError::EmptyField(field));
    }
    Ok(trimmed.to_string())
}

fn require_sample_type(conn: &Connection, id: &Uuid) -> Result<SampleType, LabError> {
    repository::get_sample_type(conn, id)?.ok_or_else(|| LabError::not_found("SampleType", *id))
}

pub fn create_sample_type(conn: &Connection, name: &str) -> Result<SampleType, LabError> {
    let sample_type = SampleType {
        id: Uuid::new_v4(),
        name: required("Sample type name", name)?,
        current_sequence: 0,
    };
    repository::insert_sample_type(conn, &sample_type)?;
    tracing::info!(id = %sample_type.id, name = %sample_type.name, "Sample type created");
    Ok(sample_type)
}

/// Check the formula/variables pairing and return the normalized pair.
pub fn check_formula(
    variables: &[String],
    formula: Option<&str>,
) -> Result<(Vec<String>, Option<String>), CatalogueError> {
    let formula = formula.map(str::trim).filter(|f| !f.is_empty());

    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(variables.len());
    for raw in variables {
        let name = raw.trim();
        if !IDENTIFIER.is_match(name) || formula::parser::is_function(name) {
            return Err(CatalogueError::InvalidVariableName(raw.clone()));
        }
        if !seen.insert(name) {
            return Err(CatalogueError::DuplicateVariable(name.to_string()));
        }
        names.push(name.to_string());
    }

    match (formula, names.is_empty()) {
        (None, true) => Ok((names, None)),
        (None, false) => Err(CatalogueError::VariablesWithoutFormula),
        (Some(_), true) => Err(CatalogueError::FormulaWithoutVariables),
        (Some(expr), false) => {
            formula::validate_formula(expr, &names)?;
            Ok((names, Some(expr.to_string())))
        }
    }
}

pub fn create_parameter(conn: &Connection, new: &NewParameter) -> Result<Parameter, LabError> {
    let name = required("Parameter name", &new.name)?;
    let unit = required("Unit", &new.unit)?;
    let test_method = required("Test method", &new.test_method)?;
    let (variables, formula) = check_formula(&new.variables, new.formula.as_deref())?;
    require_sample_type(conn, &new.sample_type_id)?;

    let parameter = Parameter {
        id: Uuid::new_v4(),
        name,
        sample_type_id: new.sample_type_id,
        unit,
        test_method,
        variables,
        formula,
    };
    repository::insert_parameter(conn, &parameter)?;
    tracing::info!(id = %parameter.id, name = %parameter.name, kind = ?parameter.kind(), "Parameter created");
    Ok(parameter)
}

pub fn create_parameter_set(conn: &Connection, new: &NewParameterSet) -> Result<ParameterSet, LabError> {
    let name = required("Parameter set name", &new.name)?;
    if new.parameters.is_empty() {
        return Err(CatalogueError::EmptyParameterSet.into());
    }
    let mut seen = HashSet::new();
    if let Some(dup) = new.parameters.iter().find(|id| !seen.insert(**id)) {
        return Err(CatalogueError::DuplicateMember(*dup).into());
    }
    require_sample_type(conn, &new.sample_type_id)?;

    let mut unknown = Vec::new();
    let mut foreign = Vec::new();
    for id in &new.parameters {
        match repository::get_parameter(conn, id)? {
            None => unknown.push(*id),
            Some(p) if p.sample_type_id != new.sample_type_id => foreign.push(*id),
            Some(_) => {}
        }
    }
    if !unknown.is_empty() {
        return Err(CatalogueError::UnknownParameters(unknown).into());
    }
    if !foreign.is_empty() {
        return Err(CatalogueError::ForeignParameters(foreign).into());
    }

    let set = ParameterSet {
        id: Uuid::new_v4(),
        name,
        sample_type_id: new.sample_type_id,
        parameters: new.parameters.clone(),
        is_partial: new.is_partial,
    };
    crate::db::with_immediate_transaction(conn, |tx| -> Result<(), LabError> {
        repository::insert_parameter_set(tx, &set)?;
        Ok(())
    })?;
    tracing::info!(id = %set.id, name = %set.name, members = set.parameters.len(), "Parameter set created");
    Ok(set)
}
