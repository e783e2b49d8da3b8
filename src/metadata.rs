//! Lab-wide metadata and the yearly counter reset.
//!
//! The lifecycle only ever reads metadata. Seeding happens once at
//! `labtrack init`; the reset is run by the scheduler through
//! `labtrack reset-sequences` at the turn of the year.

use rusqlite::Connection;

use crate::db::{self, repository};
use crate::error::LabError;
use crate::models::LabMetadata;

/// Insert the default record if none exists. Returns the stored record.
pub fn seed_metadata(conn: &Connection) -> Result<LabMetadata, LabError> {
    if repository::insert_metadata_if_absent(conn, &LabMetadata::default())? {
        tracing::info!("Seeded lab metadata with defaults");
    }
    get_metadata(conn)
}

/// The current record, falling back to defaults on an unseeded database.
/// Display only; anything that stamps a document uses `require_metadata`.
pub fn get_metadata(conn: &Connection) -> Result<LabMetadata, LabError> {
    Ok(repository::get_metadata(conn)?.unwrap_or_default())
}

/// The stored record. Fails on a database where `labtrack init` never ran.
pub fn require_metadata(conn: &Connection) -> Result<LabMetadata, LabError> {
    repository::get_metadata(conn)?.ok_or(LabError::MetadataNotSeeded)
}

/// Zero every sample type's counter. Returns how many types were reset.
pub fn reset_sample_sequences(conn: &Connection) -> Result<usize, LabError> {
    let reset = db::with_immediate_transaction(conn, |tx| -> Result<usize, LabError> {
        Ok(repository::reset_all_sequences(tx)?)
    })?;
    tracing::info!(sample_types = reset, "Reset sample sequences");
    Ok(reset)
}
