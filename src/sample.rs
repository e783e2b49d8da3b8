//! Sample lifecycle: registration, metadata edits and parameter-group changes.
//!
//! Sample codes are derived from a per-type counter. The counter bump and the
//! sample insert share one IMMEDIATE transaction, so concurrent registrations
//! queue on SQLite's write lock and every code is handed out exactly once.
//! If the insert fails the bump rolls back with it.

use std::sync::LazyLock;

use chrono::{Local, NaiveDate};
use regex::Regex;
use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use crate::codes::{generate_sample_code, YearSource};
use crate::db::{self, repository};
use crate::error::LabError;
use crate::models::{Attachment, Sample, SampleMetadata, SampleType};

static CONTACT_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{10}$").unwrap());

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSample {
    pub sample_type_id: Uuid,
    pub parameter_set_ids: Vec<Uuid>,
    #[serde(default)]
    pub received_on: Option<NaiveDate>,
    #[serde(default)]
    pub metadata: SampleMetadata,
}

/// Partial update. Metadata fields that are `Some` overwrite; a present
/// parameter-set list replaces the sample's attachments.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleUpdate {
    #[serde(default)]
    pub metadata: SampleMetadata,
    #[serde(default)]
    pub parameter_set_ids: Option<Vec<Uuid>>,
}

fn clean(field: &Option<String>) -> Option<String> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Trim every field, drop empty ones, check the contact number.
pub fn normalize_metadata(metadata: &SampleMetadata) -> Result<SampleMetadata, LabError> {
    let normalized = SampleMetadata {
        requested_by: clean(&metadata.requested_by),
        condition_or_quantity: clean(&metadata.condition_or_quantity),
        sample_detail: clean(&metadata.sample_detail),
        sampling_by: clean(&metadata.sampling_by),
        customer_name: clean(&metadata.customer_name),
        customer_address: clean(&metadata.customer_address),
        customer_contact_no: clean(&metadata.customer_contact_no),
        customer_farm_name: clean(&metadata.customer_farm_name),
        survey_no: clean(&metadata.survey_no),
        previous_crop: clean(&metadata.previous_crop),
        next_crop: clean(&metadata.next_crop),
    };
    if let Some(contact) = &normalized.customer_contact_no {
        if !CONTACT_NUMBER.is_match(contact) {
            return Err(LabError::Validation(format!(
                "Customer contact number must be exactly 10 digits, got '{contact}'"
            )));
        }
    }
    Ok(normalized)
}

fn apply_patch(current: &SampleMetadata, patch: &SampleMetadata) -> SampleMetadata {
    fn pick(new: &Option<String>, old: &Option<String>) -> Option<String> {
        new.clone().or_else(|| old.clone())
    }
    SampleMetadata {
        requested_by: pick(&patch.requested_by, &current.requested_by),
        condition_or_quantity: pick(&patch.condition_or_quantity, &current.condition_or_quantity),
        sample_detail: pick(&patch.sample_detail, &current.sample_detail),
        sampling_by: pick(&patch.sampling_by, &current.sampling_by),
        customer_name: pick(&patch.customer_name, &current.customer_name),
        customer_address: pick(&patch.customer_address, &current.customer_address),
        customer_contact_no: pick(&patch.customer_contact_no, &current.customer_contact_no),
        customer_farm_name: pick(&patch.customer_farm_name, &current.customer_farm_name),
        survey_no: pick(&patch.survey_no, &current.survey_no),
        previous_crop: pick(&patch.previous_crop, &current.previous_crop),
        next_crop: pick(&patch.next_crop, &current.next_crop),
    }
}

fn require_sample_type(conn: &Connection, id: &Uuid) -> Result<SampleType, LabError> {
    repository::get_sample_type(conn, id)?.ok_or_else(|| LabError::not_found("SampleType", *id))
}

/// Every id must name a parameter set of `sample_type_id`. All failures are
/// reported together.
fn validate_parameter_sets(conn: &Connection, sample_type_id: &Uuid, ids: &[Uuid]) -> Result<(), LabError> {
    if ids.is_empty() {
        return Err(LabError::Validation(
            "A sample needs at least one parameter set".into(),
        ));
    }
    let mut invalid = Vec::new();
    for id in ids {
        match repository::get_parameter_set(conn, id)? {
            Some(set) if set.sample_type_id == *sample_type_id => {}
            _ => {
                if !invalid.contains(id) {
                    invalid.push(*id);
                }
            }
        }
    }
    if invalid.is_empty() {
        Ok(())
    } else {
        Err(LabError::InvalidParameterSets { ids: invalid })
    }
}

/// Creates samples. Holds the year source used in sample codes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleLifecycle {
    year: YearSource,
}

impl SampleLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_year(year: YearSource) -> Self {
        Self { year }
    }

    pub fn create_sample(&self, conn: &Connection, new: &NewSample) -> Result<Sample, LabError> {
        let metadata = normalize_metadata(&new.metadata)?;
        let sample_type = require_sample_type(conn, &new.sample_type_id)?;
        validate_parameter_sets(conn, &sample_type.id, &new.parameter_set_ids)?;

        let now = Local::now().naive_local();
        let received_on = new.received_on.unwrap_or_else(|| now.date());
        let year = self.year.current();

        let sample = db::with_immediate_transaction(conn, |tx| -> Result<Sample, LabError> {
            let sequence_number = repository::next_sample_sequence(tx, &sample_type.id)?;
            let sample = Sample {
                id: Uuid::new_v4(),
                sequence_number,
                code: generate_sample_code(&sample_type.name, sequence_number, year),
                sample_type_id: sample_type.id,
                received_on,
                attachments: new
                    .parameter_set_ids
                    .iter()
                    .map(|set_id| Attachment {
                        id: Uuid::new_v4(),
                        parameter_set_id: *set_id,
                        is_reported: false,
                    })
                    .collect(),
                metadata,
                is_completed: false,
                created_at: now,
            };
            repository::insert_sample(tx, &sample)?;
            Ok(sample)
        })?;

        tracing::info!(
            id = %sample.id,
            code = %sample.code,
            attachments = sample.attachments.len(),
            "Sample created"
        );
        Ok(sample)
    }
}

/// Patch metadata and optionally replace the attached parameter sets.
///
/// Attachments are matched to the new list by parameter set, in order; a
/// matched attachment keeps its id and reported flag. Dropping an attachment
/// that already has a report is refused.
pub fn update_sample(conn: &Connection, id: &Uuid, update: &SampleUpdate) -> Result<Sample, LabError> {
    let patch = normalize_metadata(&update.metadata)?;

    let sample = db::with_immediate_transaction(conn, |tx| -> Result<Sample, LabError> {
        let mut sample = repository::get_sample(tx, id)?.ok_or_else(|| LabError::not_found("Sample", *id))?;

        sample.metadata = apply_patch(&sample.metadata, &patch);
        repository::update_sample_metadata(tx, id, &sample.metadata)?;

        if let Some(set_ids) = &update.parameter_set_ids {
            validate_parameter_sets(tx, &sample.sample_type_id, set_ids)?;
            sample.attachments = rematch_attachments(&sample.attachments, set_ids)?;
            repository::replace_attachments(tx, id, &sample.attachments)?;
        }

        sample.is_completed = sample.all_reported();
        repository::set_sample_completed(tx, id, sample.is_completed)?;
        Ok(sample)
    })?;

    tracing::info!(id = %sample.id, code = %sample.code, "Sample updated");
    Ok(sample)
}

fn rematch_attachments(existing: &[Attachment], set_ids: &[Uuid]) -> Result<Vec<Attachment>, LabError> {
    let mut unused: Vec<Option<&Attachment>> = existing.iter().map(Some).collect();

    let next = set_ids
        .iter()
        .map(|set_id| {
            let matched = unused
                .iter_mut()
                .find(|slot| slot.is_some_and(|a| a.parameter_set_id == *set_id))
                .and_then(Option::take);
            match matched {
                Some(a) => a.clone(),
                None => Attachment {
                    id: Uuid::new_v4(),
                    parameter_set_id: *set_id,
                    is_reported: false,
                },
            }
        })
        .collect();

    if let Some(dropped) = unused.into_iter().flatten().find(|a| a.is_reported) {
        return Err(LabError::ReportedAttachmentRemoved { attachment_id: dropped.id });
    }
    Ok(next)
}

pub fn get_sample(conn: &Connection, id: &Uuid) -> Result<Sample, LabError> {
    repository::get_sample(conn, id)?.ok_or_else(|| LabError::not_found("Sample", *id))
}

pub fn list_samples(conn: &Connection) -> Result<Vec<Sample>, LabError> {
    Ok(repository::list_samples(conn)?)
}

pub fn list_samples_of_type(conn: &Connection, sample_type_id: &Uuid) -> Result<Vec<Sample>, LabError> {
    require_sample_type(conn, sample_type_id)?;
    Ok(repository::list_samples_by_type(conn, sample_type_id)?)
}

pub fn list_samples_of_parameter_set(conn: &Connection, parameter_set_id: &Uuid) -> Result<Vec<Sample>, LabError> {
    if repository::get_parameter_set(conn, parameter_set_id)?.is_none() {
        return Err(LabError::not_found("ParameterSet", *parameter_set_id));
    }
    Ok(repository::list_samples_by_parameter_set(conn, parameter_set_id)?)
}
