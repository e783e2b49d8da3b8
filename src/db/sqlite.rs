//! Connection setup and schema migrations.
//!
//! `schema_version` is owned here rather than by the migration scripts: each
//! script and the row recording it commit in the same IMMEDIATE transaction,
//! so a database is always at exactly one known version.

use std::path::Path;

use rusqlite::Connection;

use super::{with_immediate_transaction, DatabaseError};
use crate::config;

/// One forward-only schema step.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial",
    sql: include_str!("../../resources/migrations/001_initial.sql"),
}];

/// Open (creating if needed) the database file and bring it to the latest schema.
pub fn open_database(path: &Path) -> Result<Connection, DatabaseError> {
    prepare(Connection::open(path)?)
}

/// Fresh in-memory database at the latest schema. Used by tests.
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    prepare(Connection::open_in_memory()?)
}

fn prepare(conn: Connection) -> Result<Connection, DatabaseError> {
    // Set first so the pragmas and migrations below also wait on a held lock.
    conn.busy_timeout(config::BUSY_TIMEOUT)?;
    conn.execute_batch(
        "PRAGMA journal_mode=DELETE;
         PRAGMA foreign_keys=ON;",
    )?;
    run_migrations(&conn)?;
    Ok(conn)
}

pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    apply_migrations(conn, MIGRATIONS)
}

fn apply_migrations(conn: &Connection, migrations: &[Migration]) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
             version INTEGER PRIMARY KEY,
             applied_at TEXT NOT NULL DEFAULT (datetime('now'))
         );",
    )?;

    let current = schema_version(conn)?;
    for migration in migrations.iter().filter(|m| m.version > current) {
        let applied = with_immediate_transaction(conn, |tx| -> Result<bool, DatabaseError> {
            // Another connection may have migrated while we waited for the lock.
            if schema_version(tx)? >= migration.version {
                return Ok(false);
            }
            tx.execute_batch(migration.sql).map_err(|e| DatabaseError::MigrationFailed {
                version: migration.version,
                reason: e.to_string(),
            })?;
            tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [migration.version])?;
            Ok(true)
        })?;
        if applied {
            tracing::info!(version = migration.version, name = migration.name, "Applied migration");
        }
    }
    Ok(())
}

/// Highest applied version, 0 on an empty `schema_version`. Query errors propagate.
pub fn schema_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let version = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
        row.get::<_, i64>(0)
    })?;
    Ok(version)
}

/// User tables in the database, `schema_version` included.
pub fn count_tables(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count)
}
