use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleType {
    pub id: Uuid,
    pub name: String,
    /// Last sequence number handed out for this type in the current year.
    pub current_sequence: u32,
}
