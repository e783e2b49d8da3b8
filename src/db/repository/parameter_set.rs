use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::ParameterSet;

/// Insert the set and its ordered member list.
pub fn insert_parameter_set(conn: &Connection, set: &ParameterSet) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO parameter_sets (id, name, sample_type_id, is_partial) VALUES (?1, ?2, ?3, ?4)",
        params![
            set.id.to_string(),
            set.name,
            set.sample_type_id.to_string(),
            set.is_partial as i32,
        ],
    )
    .map_err(DatabaseError::from_write)?;

    let mut stmt = conn.prepare(
        "INSERT INTO parameter_set_members (parameter_set_id, parameter_id, position)
         VALUES (?1, ?2, ?3)",
    )?;
    for (position, parameter_id) in set.parameters.iter().enumerate() {
        stmt.execute(params![set.id.to_string(), parameter_id.to_string(), position as i64])
            .map_err(DatabaseError::from_write)?;
    }
    Ok(())
}

pub fn get_parameter_set(conn: &Connection, id: &Uuid) -> Result<Option<ParameterSet>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, name, sample_type_id, is_partial FROM parameter_sets WHERE id = ?1",
            params![id.to_string()],
            parameter_set_row_from_rusqlite,
        )
        .optional()?;

    match row {
        Some(row) => Ok(Some(parameter_set_from_row(conn, row)?)),
        None => Ok(None),
    }
}

pub fn list_parameter_sets(conn: &Connection) -> Result<Vec<ParameterSet>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, sample_type_id, is_partial FROM parameter_sets ORDER BY name",
    )?;
    let rows = stmt.query_map([], parameter_set_row_from_rusqlite)?;

    let mut sets = Vec::new();
    for row in rows {
        sets.push(parameter_set_from_row(conn, row?)?);
    }
    Ok(sets)
}

fn member_ids(conn: &Connection, parameter_set_id: &str) -> Result<Vec<Uuid>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT parameter_id FROM parameter_set_members
         WHERE parameter_set_id = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![parameter_set_id], |row| row.get::<_, String>(0))?;

    let mut ids = Vec::new();
    for row in rows {
        ids.push(parse_uuid(&row?)?);
    }
    Ok(ids)
}

struct ParameterSetRow {
    id: String,
    name: String,
    sample_type_id: String,
    is_partial: i32,
}

fn parameter_set_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<ParameterSetRow, rusqlite::Error> {
    Ok(ParameterSetRow {
        id: row.get(0)?,
        name: row.get(1)?,
        sample_type_id: row.get(2)?,
        is_partial: row.get(3)?,
    })
}

fn parameter_set_from_row(conn: &Connection, row: ParameterSetRow) -> Result<ParameterSet, DatabaseError> {
    Ok(ParameterSet {
        parameters: member_ids(conn, &row.id)?,
        id: parse_uuid(&row.id)?,
        name: row.name,
        sample_type_id: parse_uuid(&row.sample_type_id)?,
        is_partial: row.is_partial != 0,
    })
}
