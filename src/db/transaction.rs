//! Unit-of-work primitive for multi-row writes.
//!
//! Every lifecycle write runs inside `with_immediate_transaction`. The
//! transaction is opened with `BEGIN IMMEDIATE`, which takes SQLite's reserved
//! lock before the first read, so two writers can never both observe the same
//! pre-increment counter value. Callers receive the transaction as a plain
//! `&Connection` and hand it down to repository functions unchanged.

use rusqlite::{Connection, Transaction, TransactionBehavior};

use super::DatabaseError;

/// Run `work` inside an IMMEDIATE transaction.
///
/// Commits when `work` returns `Ok`. On `Err` the transaction is dropped,
/// which rolls back every write performed through it, and the original error
/// is returned unchanged.
pub fn with_immediate_transaction<T, E, F>(conn: &Connection, work: F) -> Result<T, E>
where
    F: FnOnce(&Transaction<'_>) -> Result<T, E>,
    E: From<DatabaseError> + std::fmt::Display,
{
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .map_err(|e| E::from(DatabaseError::Sqlite(e)))?;

    match work(&tx) {
        Ok(value) => {
            tx.commit().map_err(|e| E::from(DatabaseError::Sqlite(e)))?;
            Ok(value)
        }
        Err(err) => {
            tracing::warn!(error = %err, "Rolling back transaction");
            drop(tx);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn sequence_of(conn: &Connection, name: &str) -> i64 {
        conn.query_row(
            "SELECT current_sequence FROM sample_types WHERE name = ?1",
            [name],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn commits_on_success() {
        let conn = open_memory_database().unwrap();
        conn.execute(
            "INSERT INTO sample_types (id, name, current_sequence) VALUES ('t1', 'Soil', 0)",
            [],
        )
        .unwrap();

        let result: Result<(), DatabaseError> = with_immediate_transaction(&conn, |tx| {
            tx.execute("UPDATE sample_types SET current_sequence = 5 WHERE id = 't1'", [])?;
            Ok(())
        });

        assert!(result.is_ok());
        assert_eq!(sequence_of(&conn, "Soil"), 5);
    }

    #[test]
    fn rolls_back_on_error() {
        let conn = open_memory_database().unwrap();
        conn.execute(
            "INSERT INTO sample_types (id, name, current_sequence) VALUES ('t1', 'Soil', 0)",
            [],
        )
        .unwrap();

        let result: Result<(), DatabaseError> = with_immediate_transaction(&conn, |tx| {
            tx.execute("UPDATE sample_types SET current_sequence = 5 WHERE id = 't1'", [])?;
            Err(DatabaseError::ConstraintViolation("forced".into()))
        });

        assert!(matches!(result, Err(DatabaseError::ConstraintViolation(_))));
        assert_eq!(sequence_of(&conn, "Soil"), 0);
        assert!(conn.is_autocommit());
    }
}
