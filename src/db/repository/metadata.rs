use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::LabMetadata;

/// Insert the single metadata record unless one exists. Returns true when inserted.
pub fn insert_metadata_if_absent(conn: &Connection, metadata: &LabMetadata) -> Result<bool, DatabaseError> {
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO lab_metadata
             (id, current_certification_number, current_revision, analysed_by, approved_by)
             VALUES (1, ?1, ?2, ?3, ?4)",
            params![
                metadata.current_certification_number,
                metadata.current_revision,
                metadata.analysed_by,
                metadata.approved_by,
            ],
        )
        .map_err(DatabaseError::from_write)?;
    Ok(inserted == 1)
}

pub fn get_metadata(conn: &Connection) -> Result<Option<LabMetadata>, DatabaseError> {
    let metadata = conn
        .query_row(
            "SELECT current_certification_number, current_revision, analysed_by, approved_by
             FROM lab_metadata WHERE id = 1",
            [],
            |row| {
                Ok(LabMetadata {
                    current_certification_number: row.get(0)?,
                    current_revision: row.get(1)?,
                    analysed_by: row.get(2)?,
                    approved_by: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(metadata)
}
