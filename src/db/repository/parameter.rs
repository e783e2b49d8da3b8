use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::Parameter;

const PARAMETER_COLUMNS: &str =
    "p.id, p.name, p.sample_type_id, p.unit, p.test_method, p.variables, p.formula";

pub fn insert_parameter(conn: &Connection, parameter: &Parameter) -> Result<(), DatabaseError> {
    let variables = serde_json::to_string(&parameter.variables)
        .map_err(|e| DatabaseError::Corrupt(e.to_string()))?;
    conn.execute(
        "INSERT INTO parameters (id, name, sample_type_id, unit, test_method, variables, formula)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            parameter.id.to_string(),
            parameter.name,
            parameter.sample_type_id.to_string(),
            parameter.unit,
            parameter.test_method,
            variables,
            parameter.formula,
        ],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(())
}

pub fn get_parameter(conn: &Connection, id: &Uuid) -> Result<Option<Parameter>, DatabaseError> {
    let sql = format!("SELECT {PARAMETER_COLUMNS} FROM parameters p WHERE p.id = ?1");
    let row = conn
        .query_row(&sql, params![id.to_string()], parameter_row_from_rusqlite)
        .optional()?;
    row.map(parameter_from_row).transpose()
}

/// Members of a parameter set, in set order.
pub fn get_parameters_of_set(conn: &Connection, parameter_set_id: &Uuid) -> Result<Vec<Parameter>, DatabaseError> {
    let sql = format!(
        "SELECT {PARAMETER_COLUMNS} FROM parameters p
         JOIN parameter_set_members m ON m.parameter_id = p.id
         WHERE m.parameter_set_id = ?1 ORDER BY m.position"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![parameter_set_id.to_string()], parameter_row_from_rusqlite)?;

    let mut parameters = Vec::new();
    for row in rows {
        parameters.push(parameter_from_row(row?)?);
    }
    Ok(parameters)
}

pub fn list_parameters_of_type(conn: &Connection, sample_type_id: &Uuid) -> Result<Vec<Parameter>, DatabaseError> {
    let sql = format!(
        "SELECT {PARAMETER_COLUMNS} FROM parameters p WHERE p.sample_type_id = ?1 ORDER BY p.name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![sample_type_id.to_string()], parameter_row_from_rusqlite)?;

    let mut parameters = Vec::new();
    for row in rows {
        parameters.push(parameter_from_row(row?)?);
    }
    Ok(parameters)
}

struct ParameterRow {
    id: String,
    name: String,
    sample_type_id: String,
    unit: String,
    test_method: String,
    variables: String,
    formula: Option<String>,
}

fn parameter_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<ParameterRow, rusqlite::Error> {
    Ok(ParameterRow {
        id: row.get(0)?,
        name: row.get(1)?,
        sample_type_id: row.get(2)?,
        unit: row.get(3)?,
        test_method: row.get(4)?,
        variables: row.get(5)?,
        formula: row.get(6)?,
    })
}

fn parameter_from_row(row: ParameterRow) -> Result<Parameter, DatabaseError> {
    let variables: Vec<String> = serde_json::from_str(&row.variables)
        .map_err(|e| DatabaseError::Corrupt(format!("parameter {} variables: {e}", row.id)))?;
    Ok(Parameter {
        id: parse_uuid(&row.id)?,
        name: row.name,
        sample_type_id: parse_uuid(&row.sample_type_id)?,
        unit: row.unit,
        test_method: row.test_method,
        variables,
        formula: row.formula,
    })
}
