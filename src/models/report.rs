use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The slice of a report record this service needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRef {
    pub report_id: i64,
    pub owner_id: Uuid,
    pub title: String,
    pub status: String,
}
