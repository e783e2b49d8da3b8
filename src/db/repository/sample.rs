use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{parse_date, parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::{Attachment, Sample, SampleMetadata};

const SAMPLE_COLUMNS: &str = "s.id, s.sequence_number, s.code, s.sample_type_id, s.received_on,
     s.requested_by, s.condition_or_quantity, s.sample_detail, s.sampling_by, s.customer_name,
     s.customer_address, s.customer_contact_no, s.customer_farm_name, s.survey_no,
     s.previous_crop, s.next_crop, s.is_completed, s.created_at";

pub fn insert_sample(conn: &Connection, sample: &Sample) -> Result<(), DatabaseError> {
    let m = &sample.metadata;
    conn.execute(
        "INSERT INTO samples (id, sequence_number, code, sample_type_id, received_on,
         requested_by, condition_or_quantity, sample_detail, sampling_by, customer_name,
         customer_address, customer_contact_no, customer_farm_name, survey_no,
         previous_crop, next_crop, is_completed, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            sample.id.to_string(),
            sample.sequence_number,
            sample.code,
            sample.sample_type_id.to_string(),
            sample.received_on.to_string(),
            m.requested_by,
            m.condition_or_quantity,
            m.sample_detail,
            m.sampling_by,
            m.customer_name,
            m.customer_address,
            m.customer_contact_no,
            m.customer_farm_name,
            m.survey_no,
            m.previous_crop,
            m.next_crop,
            sample.is_completed as i32,
            sample.created_at.to_string(),
        ],
    )
    .map_err(DatabaseError::from_write)?;

    insert_attachments(conn, &sample.id, &sample.attachments)
}

fn insert_attachments(conn: &Connection, sample_id: &Uuid, attachments: &[Attachment]) -> Result<(), DatabaseError> {
    let mut stmt = conn.prepare(
        "INSERT INTO sample_attachments (id, sample_id, parameter_set_id, position, is_reported)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (position, attachment) in attachments.iter().enumerate() {
        stmt.execute(params![
            attachment.id.to_string(),
            sample_id.to_string(),
            attachment.parameter_set_id.to_string(),
            position as i64,
            attachment.is_reported as i32,
        ])
        .map_err(DatabaseError::from_write)?;
    }
    Ok(())
}

pub fn get_sample(conn: &Connection, id: &Uuid) -> Result<Option<Sample>, DatabaseError> {
    let sql = format!("SELECT {SAMPLE_COLUMNS} FROM samples s WHERE s.id = ?1");
    let row = conn
        .query_row(&sql, params![id.to_string()], sample_row_from_rusqlite)
        .optional()?;

    match row {
        Some(row) => Ok(Some(sample_from_row(conn, row)?)),
        None => Ok(None),
    }
}

pub fn list_samples(conn: &Connection) -> Result<Vec<Sample>, DatabaseError> {
    let sql = format!("SELECT {SAMPLE_COLUMNS} FROM samples s ORDER BY s.created_at, s.code");
    query_samples(conn, &sql, params![])
}

pub fn list_samples_by_type(conn: &Connection, sample_type_id: &Uuid) -> Result<Vec<Sample>, DatabaseError> {
    let sql = format!(
        "SELECT {SAMPLE_COLUMNS} FROM samples s WHERE s.sample_type_id = ?1
         ORDER BY s.created_at, s.code"
    );
    query_samples(conn, &sql, params![sample_type_id.to_string()])
}

/// Samples with at least one attachment of the given parameter set.
pub fn list_samples_by_parameter_set(conn: &Connection, parameter_set_id: &Uuid) -> Result<Vec<Sample>, DatabaseError> {
    let sql = format!(
        "SELECT {SAMPLE_COLUMNS} FROM samples s
         WHERE EXISTS (SELECT 1 FROM sample_attachments a
                       WHERE a.sample_id = s.id AND a.parameter_set_id = ?1)
         ORDER BY s.created_at, s.code"
    );
    query_samples(conn, &sql, params![parameter_set_id.to_string()])
}

fn query_samples(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Sample>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, sample_row_from_rusqlite)?;

    let mut samples = Vec::new();
    for row in rows {
        samples.push(sample_from_row(conn, row?)?);
    }
    Ok(samples)
}

pub fn update_sample_metadata(conn: &Connection, id: &Uuid, m: &SampleMetadata) -> Result<(), DatabaseError> {
    let changed = conn
        .execute(
            "UPDATE samples SET requested_by = ?2, condition_or_quantity = ?3, sample_detail = ?4,
             sampling_by = ?5, customer_name = ?6, customer_address = ?7, customer_contact_no = ?8,
             customer_farm_name = ?9, survey_no = ?10, previous_crop = ?11, next_crop = ?12
             WHERE id = ?1",
            params![
                id.to_string(),
                m.requested_by,
                m.condition_or_quantity,
                m.sample_detail,
                m.sampling_by,
                m.customer_name,
                m.customer_address,
                m.customer_contact_no,
                m.customer_farm_name,
                m.survey_no,
                m.previous_crop,
                m.next_crop,
            ],
        )
        .map_err(DatabaseError::from_write)?;
    not_found_if_zero(changed, id)
}

/// Swap the sample's attachment list for `attachments`, preserving given ids.
pub fn replace_attachments(conn: &Connection, sample_id: &Uuid, attachments: &[Attachment]) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM sample_attachments WHERE sample_id = ?1",
        params![sample_id.to_string()],
    )?;
    insert_attachments(conn, sample_id, attachments)
}

pub fn set_sample_completed(conn: &Connection, id: &Uuid, is_completed: bool) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE samples SET is_completed = ?2 WHERE id = ?1",
        params![id.to_string(), is_completed as i32],
    )?;
    not_found_if_zero(changed, id)
}

/// Flip one attachment from unreported to reported.
///
/// Returns false when the attachment does not exist or was already reported,
/// so two racing report creations cannot both succeed.
pub fn mark_attachment_reported(conn: &Connection, sample_id: &Uuid, attachment_id: &Uuid) -> Result<bool, DatabaseError> {
    let changed = conn
        .execute(
            "UPDATE sample_attachments SET is_reported = 1
             WHERE id = ?1 AND sample_id = ?2 AND is_reported = 0",
            params![attachment_id.to_string(), sample_id.to_string()],
        )
        .map_err(DatabaseError::from_write)?;
    Ok(changed == 1)
}

pub fn count_unreported_attachments(conn: &Connection, sample_id: &Uuid) -> Result<u32, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM sample_attachments WHERE sample_id = ?1 AND is_reported = 0",
        params![sample_id.to_string()],
        |row| row.get::<_, u32>(0),
    )?;
    Ok(count)
}

fn get_attachments(conn: &Connection, sample_id: &str) -> Result<Vec<Attachment>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, parameter_set_id, is_reported FROM sample_attachments
         WHERE sample_id = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![sample_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i32>(2)?,
        ))
    })?;

    let mut attachments = Vec::new();
    for row in rows {
        let (id, parameter_set_id, is_reported) = row?;
        attachments.push(Attachment {
            id: parse_uuid(&id)?,
            parameter_set_id: parse_uuid(&parameter_set_id)?,
            is_reported: is_reported != 0,
        });
    }
    Ok(attachments)
}

fn not_found_if_zero(changed: usize, id: &Uuid) -> Result<(), DatabaseError> {
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Sample".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

// Internal row type for Sample mapping
struct SampleRow {
    id: String,
    sequence_number: u32,
    code: String,
    sample_type_id: String,
    received_on: String,
    metadata: SampleMetadata,
    is_completed: i32,
    created_at: String,
}

fn sample_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<SampleRow, rusqlite::Error> {
    Ok(SampleRow {
        id: row.get(0)?,
        sequence_number: row.get(1)?,
        code: row.get(2)?,
        sample_type_id: row.get(3)?,
        received_on: row.get(4)?,
        metadata: SampleMetadata {
            requested_by: row.get(5)?,
            condition_or_quantity: row.get(6)?,
            sample_detail: row.get(7)?,
            sampling_by: row.get(8)?,
            customer_name: row.get(9)?,
            customer_address: row.get(10)?,
            customer_contact_no: row.get(11)?,
            customer_farm_name: row.get(12)?,
            survey_no: row.get(13)?,
            previous_crop: row.get(14)?,
            next_crop: row.get(15)?,
        },
        is_completed: row.get(16)?,
        created_at: row.get(17)?,
    })
}

fn sample_from_row(conn: &Connection, row: SampleRow) -> Result<Sample, DatabaseError> {
    Ok(Sample {
        attachments: get_attachments(conn, &row.id)?,
        id: parse_uuid(&row.id)?,
        sequence_number: row.sequence_number,
        code: row.code,
        sample_type_id: parse_uuid(&row.sample_type_id)?,
        received_on: parse_date(&row.received_on)?,
        metadata: row.metadata,
        is_completed: row.is_completed != 0,
        created_at: parse_datetime(&row.created_at)?,
    })
}
