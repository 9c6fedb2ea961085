use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Free-form organizer attribute map. Known keys are promoted to fields so
/// the rest of the pipeline can address them without re-parsing JSON on
/// every access; anything else the upstream feed sends along is preserved
/// under `extra` and is still reachable via the filter engine's dotted path
/// (`organizer.whatever`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Organizer {
    #[serde(rename = "fullName", default)]
    pub full_name: Option<String>,
    #[serde(rename = "shortName", default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub inn: Option<String>,
    #[serde(default)]
    pub kpp: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Root entity. Keyed by the externally supplied id, owns lots/documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tender {
    pub external_id: String,
    pub title: String,
    pub notification_number: Option<String>,
    pub notification_type: Option<String>,
    pub organizer: Organizer,
    pub initial_price: Option<BigDecimal>,
    pub currency: Option<String>,
    pub application_deadline: Option<DateTime<Utc>>,
    pub etp_code: Option<String>,
    pub etp_name: Option<String>,
    pub etp_url: Option<String>,
    pub kontur_link: Option<String>,
    pub publication_date: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    pub selection_method: Option<String>,
    pub smp: Option<String>,
    /// category/type — referenced by the filter engine as `.type`
    pub r#type: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub lots: Vec<Lot>,
    pub docs: Vec<Document>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lot {
    pub id: Option<i32>,
    pub tender_id: String,
    pub title: String,
    pub customer_id: Option<i32>,
    pub initial_sum: Option<BigDecimal>,
    pub currency: Option<String>,
    pub delivery_place: Option<String>,
    pub delivery_term: Option<String>,
    pub payment_term: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageLocation {
    Original,
    S3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Downloaded,
    Error,
}

/// Unique on (tender_id, file_name); duplicate inserts collapse into an
/// update of url/location/status (see persistence::upsert_document).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Option<i32>,
    pub tender_id: String,
    pub file_name: String,
    pub url: String,
    pub storage_location: StorageLocation,
    pub status: DocumentStatus,
}

/// Rule row — condition is a JSON expression tree, see filter_engine::Condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub r#type: String,
    pub priority: i32,
    pub active: bool,
    pub parent_id: Option<i32>,
    pub calculation: String,
    pub success_action: Option<i32>,
    pub condition: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AiStatus {
    Pending,
    Success,
    Rejected,
    Error,
    Failed,
    Timeout,
}

impl std::fmt::Display for AiStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AiStatus::Pending => "PENDING",
            AiStatus::Success => "SUCCESS",
            AiStatus::Rejected => "REJECTED",
            AiStatus::Error => "ERROR",
            AiStatus::Failed => "FAILED",
            AiStatus::Timeout => "TIMEOUT",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiCheck {
    pub id: Option<i32>,
    pub tender_id: String,
    pub ai_status: AiStatus,
    pub task_id: Option<String>,
    pub ai_response: Option<String>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRow {
    pub id: Option<i32>,
    pub tender_id: String,
    pub module: String,
    pub error_message: String,
    pub created_at: DateTime<Utc>,
}

/// §6 status query response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenderStatusResponse {
    pub status: String,
    pub tender_id: String,
    pub state: String,
}

/// §6 paginated list query parameters (shared by tenders and filters reads).
#[derive(Debug, Clone, Deserialize)]
pub struct ListQuery {
    #[serde(default = "ListQuery::default_page")]
    pub page: u32,
    #[serde(default = "ListQuery::default_per_page")]
    pub per_page: u32,
    pub sort_field: Option<String>,
    #[serde(default)]
    pub sort_desc: bool,
}

impl ListQuery {
    fn default_page() -> u32 {
        1
    }
    fn default_per_page() -> u32 {
        20
    }

    /// §8 boundary: per_page=100 accepted, 101 rejected; page >= 1.
    pub fn validate(&self) -> Result<(), String> {
        if self.page < 1 {
            return Err("page must be >= 1".to_string());
        }
        if self.per_page < 1 || self.per_page > 100 {
            return Err("per_page must be between 1 and 100".to_string());
        }
        Ok(())
    }
}
