use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{parse_date, parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::{Report, TestResult};

const REPORT_COLUMNS: &str = "r.id, r.sample_id, r.attachment_id, r.ulr, r.parameter_set_id,
     r.is_authorised, r.analysis_started_on, r.analysis_ended_on, r.created_at";

pub fn insert_report(conn: &Connection, report: &Report) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO reports (id, sample_id, attachment_id, ulr, parameter_set_id, is_authorised,
         analysis_started_on, analysis_ended_on, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            report.id.to_string(),
            report.sample_id.to_string(),
            report.attachment_id.to_string(),
            report.ulr,
            report.parameter_set_id.to_string(),
            report.is_authorised as i32,
            report.analysis_started_on.to_string(),
            report.analysis_ended_on.to_string(),
            report.created_at.to_string(),
        ],
    )
    .map_err(DatabaseError::from_write)?;

    insert_results(conn, &report.id, &report.test_results)
}

fn insert_results(conn: &Connection, report_id: &Uuid, results: &[TestResult]) -> Result<(), DatabaseError> {
    let mut stmt = conn.prepare(
        "INSERT INTO report_results (report_id, parameter_id, position, value)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (position, result) in results.iter().enumerate() {
        stmt.execute(params![
            report_id.to_string(),
            result.parameter_id.to_string(),
            position as i64,
            result.value,
        ])
        .map_err(DatabaseError::from_write)?;
    }
    Ok(())
}

/// Replace the whole result list of a report, keeping list order as position.
pub fn replace_results(conn: &Connection, report_id: &Uuid, results: &[TestResult]) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM report_results WHERE report_id = ?1",
        params![report_id.to_string()],
    )?;
    insert_results(conn, report_id, results)
}

pub fn get_report(conn: &Connection, id: &Uuid) -> Result<Option<Report>, DatabaseError> {
    let sql = format!("SELECT {REPORT_COLUMNS} FROM reports r WHERE r.id = ?1");
    let row = conn
        .query_row(&sql, params![id.to_string()], report_row_from_rusqlite)
        .optional()?;

    match row {
        Some(row) => Ok(Some(report_from_row(conn, row)?)),
        None => Ok(None),
    }
}

pub fn list_reports(conn: &Connection) -> Result<Vec<Report>, DatabaseError> {
    let sql = format!("SELECT {REPORT_COLUMNS} FROM reports r ORDER BY r.created_at, r.ulr");
    query_reports(conn, &sql, params![])
}

pub fn list_reports_by_sample(conn: &Connection, sample_id: &Uuid) -> Result<Vec<Report>, DatabaseError> {
    let sql = format!(
        "SELECT {REPORT_COLUMNS} FROM reports r WHERE r.sample_id = ?1
         ORDER BY r.created_at, r.ulr"
    );
    query_reports(conn, &sql, params![sample_id.to_string()])
}

/// Reports whose sample is of the given type.
pub fn list_reports_by_sample_type(conn: &Connection, sample_type_id: &Uuid) -> Result<Vec<Report>, DatabaseError> {
    let sql = format!(
        "SELECT {REPORT_COLUMNS} FROM reports r
         JOIN samples s ON s.id = r.sample_id
         WHERE s.sample_type_id = ?1
         ORDER BY r.created_at, r.ulr"
    );
    query_reports(conn, &sql, params![sample_type_id.to_string()])
}

fn query_reports(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Report>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, report_row_from_rusqlite)?;

    let mut reports = Vec::new();
    for row in rows {
        reports.push(report_from_row(conn, row?)?);
    }
    Ok(reports)
}

/// Authorisation flag of a report, `None` when the report does not exist.
pub fn is_report_authorised(conn: &Connection, id: &Uuid) -> Result<Option<bool>, DatabaseError> {
    let flag = conn
        .query_row(
            "SELECT is_authorised FROM reports WHERE id = ?1",
            params![id.to_string()],
            |row| row.get::<_, i32>(0),
        )
        .optional()?;
    Ok(flag.map(|f| f != 0))
}

/// Flip an unauthorised report to authorised. Returns false if nothing changed.
pub fn mark_report_authorised(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE reports SET is_authorised = 1 WHERE id = ?1 AND is_authorised = 0",
        params![id.to_string()],
    )?;
    Ok(changed == 1)
}

fn get_results(conn: &Connection, report_id: &str) -> Result<Vec<TestResult>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT parameter_id, value FROM report_results WHERE report_id = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![report_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut results = Vec::new();
    for row in rows {
        let (parameter_id, value) = row?;
        results.push(TestResult {
            parameter_id: parse_uuid(&parameter_id)?,
            value,
        });
    }
    Ok(results)
}

// Internal row type for Report mapping
struct ReportRow {
    id: String,
    sample_id: String,
    attachment_id: String,
    ulr: String,
    parameter_set_id: String,
    is_authorised: i32,
    analysis_started_on: String,
    analysis_ended_on: String,
    created_at: String,
}

fn report_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<ReportRow, rusqlite::Error> {
    Ok(ReportRow {
        id: row.get(0)?,
        sample_id: row.get(1)?,
        attachment_id: row.get(2)?,
        ulr: row.get(3)?,
        parameter_set_id: row.get(4)?,
        is_authorised: row.get(5)?,
        analysis_started_on: row.get(6)?,
        analysis_ended_on: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn report_from_row(conn: &Connection, row: ReportRow) -> Result<Report, DatabaseError> {
    Ok(Report {
        test_results: get_results(conn, &row.id)?,
        id: parse_uuid(&row.id)?,
        sample_id: parse_uuid(&row.sample_id)?,
        attachment_id: parse_uuid(&row.attachment_id)?,
        ulr: row.ulr,
        parameter_set_id: parse_uuid(&row.parameter_set_id)?,
        is_authorised: row.is_authorised != 0,
        analysis_started_on: parse_date(&row.analysis_started_on)?,
        analysis_ended_on: parse_date(&row.analysis_ended_on)?,
        created_at: parse_datetime(&row.created_at)?,
    })
}
