use serde::{Deserialize, Serialize};

/// Lab-wide record used on every report (certification number for the ULR,
/// signatories for the rendered document).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabMetadata {
    pub current_certification_number: u32,
    pub current_revision: String,
    pub analysed_by: String,
    pub approved_by: String,
}

impl Default for LabMetadata {
    fn default() -> Self {
        Self {
            current_certification_number: 7275,
            current_revision: "01".into(),
            analysed_by: "Mr. L. Analyst".into(),
            approved_by: "Mr. L. Admin".into(),
        }
    }
}
