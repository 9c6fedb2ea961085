use serde::{Deserialize, Serialize};

/// SQS message body triggering processing of one already-persisted tender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessMessage {
    pub tender_id: String,
    #[serde(rename = "type")]
    pub tender_type: String,
}
