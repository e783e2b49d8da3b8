use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One parameter group attached to a sample, reported at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: Uuid,
    pub parameter_set_id: Uuid,
    pub is_reported: bool,
}

/// Customer and sampling details. Free text, never interpreted by the lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleMetadata {
    pub requested_by: Option<String>,
    pub condition_or_quantity: Option<String>,
    pub sample_detail: Option<String>,
    pub sampling_by: Option<String>,
    pub customer_name: Option<String>,
    pub customer_address: Option<String>,
    pub customer_contact_no: Option<String>,
    pub customer_farm_name: Option<String>,
    pub survey_no: Option<String>,
    pub previous_crop: Option<String>,
    pub next_crop: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub id: Uuid,
    pub sequence_number: u32,
    pub code: String,
    pub sample_type_id: Uuid,
    pub received_on: NaiveDate,
    pub attachments: Vec<Attachment>,
    pub metadata: SampleMetadata,
    pub is_completed: bool,
    pub created_at: NaiveDateTime,
}

impl Sample {
    pub fn attachment(&self, attachment_id: &Uuid) -> Option<&Attachment> {
        self.attachments.iter().find(|a| &a.id == attachment_id)
    }

    /// True when every attachment has been reported.
    pub fn all_reported(&self) -> bool {
        self.attachments.iter().all(|a| a.is_reported)
    }
}
