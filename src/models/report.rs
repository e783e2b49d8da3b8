use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub parameter_id: Uuid,
    pub value: String,
}

/// Dates the analysis ran between, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisWindow {
    pub started_on: NaiveDate,
    pub ended_on: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: Uuid,
    pub sample_id: Uuid,
    pub attachment_id: Uuid,
    pub ulr: String,
    pub parameter_set_id: Uuid,
    pub test_results: Vec<TestResult>,
    pub is_authorised: bool,
    pub analysis_started_on: NaiveDate,
    pub analysis_ended_on: NaiveDate,
    pub created_at: NaiveDateTime,
}
