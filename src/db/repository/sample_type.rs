use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::SampleType;

pub fn insert_sample_type(conn: &Connection, sample_type: &SampleType) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO sample_types (id, name, current_sequence) VALUES (?1, ?2, ?3)",
        params![
            sample_type.id.to_string(),
            sample_type.name,
            sample_type.current_sequence,
        ],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(())
}

pub fn get_sample_type(conn: &Connection, id: &Uuid) -> Result<Option<SampleType>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, name, current_sequence FROM sample_types WHERE id = ?1",
            params![id.to_string()],
            sample_type_row_from_rusqlite,
        )
        .optional()?;
    row.map(sample_type_from_row).transpose()
}

pub fn list_sample_types(conn: &Connection) -> Result<Vec<SampleType>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT id, name, current_sequence FROM sample_types ORDER BY name")?;
    let rows = stmt.query_map([], sample_type_row_from_rusqlite)?;

    let mut types = Vec::new();
    for row in rows {
        types.push(sample_type_from_row(row?)?);
    }
    Ok(types)
}

/// Bump the type's counter and return the new value.
///
/// Must run inside the caller's write transaction so the bump rolls back
/// together with whatever the number was reserved for.
pub fn next_sample_sequence(conn: &Connection, sample_type_id: &Uuid) -> Result<u32, DatabaseError> {
    conn.query_row(
        "UPDATE sample_types SET current_sequence = current_sequence + 1
         WHERE id = ?1 RETURNING current_sequence",
        params![sample_type_id.to_string()],
        |row| row.get::<_, u32>(0),
    )
    .optional()
    .map_err(DatabaseError::from_write)?
    .ok_or_else(|| DatabaseError::NotFound {
        entity_type: "SampleType".into(),
        id: sample_type_id.to_string(),
    })
}

/// Yearly reset: every counter back to zero. Returns the number of types touched.
pub fn reset_all_sequences(conn: &Connection) -> Result<usize, DatabaseError> {
    let changed = conn.execute("UPDATE sample_types SET current_sequence = 0", [])?;
    Ok(changed)
}

struct SampleTypeRow {
    id: String,
    name: String,
    current_sequence: u32,
}

fn sample_type_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<SampleTypeRow, rusqlite::Error> {
    Ok(SampleTypeRow {
        id: row.get(0)?,
        name: row.get(1)?,
        current_sequence: row.get(2)?,
    })
}

fn sample_type_from_row(row: SampleTypeRow) -> Result<SampleType, DatabaseError> {
    Ok(SampleType {
        id: parse_uuid(&row.id)?,
        name: row.name,
        current_sequence: row.current_sequence,
    })
}
