//! Crate-wide error type returned by every lifecycle and catalogue operation.
//!
//! Module errors keep their own enums and convert in with `?`. Callers that
//! need to branch (HTTP status, CLI exit code) use `kind()` rather than
//! matching variants.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::catalogue::CatalogueError;
use crate::compiler::{CompileError, ComputationError};
use crate::db::DatabaseError;
use crate::models::enums::Role;
use crate::test_data::TestDataError;

/// Stable classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Validation,
    Conflict,
    Unauthorised,
    Computation,
    Storage,
}

#[derive(Error, Debug)]
pub enum LabError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Lab metadata has not been seeded; run `labtrack init`")]
    MetadataNotSeeded,

    #[error("Invalid test data: {0}")]
    TestData(#[from] TestDataError),

    #[error("Test data does not match the parameter set: {0}")]
    Compile(#[from] CompileError),

    #[error("Catalogue error: {0}")]
    Catalogue(#[from] CatalogueError),

    #[error("{0}")]
    Computation(#[from] ComputationError),

    #[error("Parameter sets not valid for this sample type: {}", join_ids(.ids))]
    InvalidParameterSets { ids: Vec<Uuid> },

    #[error("Attachment {attachment_id} has already been reported")]
    AttachmentAlreadyReported { attachment_id: Uuid },

    #[error("Attachment {attachment_id} has a report and cannot be removed")]
    ReportedAttachmentRemoved { attachment_id: Uuid },

    #[error("Report {report_id} is authorised and can no longer be changed")]
    ReportAlreadyAuthorised { report_id: Uuid },

    #[error("Report {report_id} is already authorised")]
    AlreadyAuthorised { report_id: Uuid },

    #[error("Role '{role}' may not authorise reports")]
    Unauthorised { role: Role },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn join_ids(ids: &[Uuid]) -> String {
    ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(", ")
}

impl LabError {
    pub(crate) fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Database(DatabaseError::NotFound { .. })
            | Self::NotFound { .. }
            | Self::MetadataNotSeeded => ErrorKind::NotFound,
            Self::Database(DatabaseError::ConstraintViolation(_)) => ErrorKind::Conflict,
            Self::Database(_) | Self::Io(_) | Self::Serialization(_) => ErrorKind::Storage,
            Self::Validation(_)
            | Self::TestData(_)
            | Self::Compile(_)
            | Self::Catalogue(_)
            | Self::InvalidParameterSets { .. } => ErrorKind::Validation,
            Self::Computation(_) => ErrorKind::Computation,
            Self::AttachmentAlreadyReported { .. }
            | Self::ReportedAttachmentRemoved { .. }
            | Self::ReportAlreadyAuthorised { .. }
            | Self::AlreadyAuthorised { .. } => ErrorKind::Conflict,
            Self::Unauthorised { .. } => ErrorKind::Unauthorised,
        }
    }

    /// Every id the error is about: all rejected parameter sets, all failing
    /// parameters, or the single entity involved.
    pub fn offending_ids(&self) -> Vec<Uuid> {
        match self {
            Self::NotFound { id, .. } => vec![*id],
            Self::InvalidParameterSets { ids } => ids.clone(),
            Self::Computation(e) => e.failures.iter().map(|f| f.parameter_id).collect(),
            Self::Compile(e) => match e {
                CompileError::UnknownParameter(id) => vec![*id],
                CompileError::ShapeMismatch { parameter, .. }
                | CompileError::UnknownVariable { parameter, .. }
                | CompileError::NonNumericVariable { parameter, .. } => vec![*parameter],
            },
            Self::TestData(TestDataError::DuplicateParameter(id)) => vec![*id],
            Self::Catalogue(e) => e.offending_ids(),
            Self::AttachmentAlreadyReported { attachment_id }
            | Self::ReportedAttachmentRemoved { attachment_id } => vec![*attachment_id],
            Self::ReportAlreadyAuthorised { report_id } | Self::AlreadyAuthorised { report_id } => {
                vec![*report_id]
            }
            _ => Vec::new(),
        }
    }
}
