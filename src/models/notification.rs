use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    System,
    Report,
    Complaint,
    Message,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::System => "system",
            NotificationType::Report => "report",
            NotificationType::Complaint => "complaint",
            NotificationType::Message => "message",
        }
    }

    /// Realtime event name emitted alongside `notification:new`
    pub fn event_name(&self) -> String {
        format!("notification:{}", self.as_str())
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(NotificationType::System),
            "report" => Ok(NotificationType::Report),
            "complaint" => Ok(NotificationType::Complaint),
            "message" => Ok(NotificationType::Message),
            other => Err(format!("unknown notification type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub notification_id: i64,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: Option<String>,
    pub related_id: Option<i64>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: NotificationType,
    pub title: String,
    pub message: Option<String>,
    pub related_id: Option<i64>,
}

/// Store-level listing options, already clamped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationFilter {
    pub limit: i64,
    pub offset: i64,
    pub only_unread: bool,
}

impl NotificationFilter {
    /// limit -> [1, 100] (default 20), offset -> >= 0 (default 0)
    pub fn clamped(limit: Option<i64>, offset: Option<i64>, only_unread: bool) -> Self {
        Self {
            limit: limit
                .unwrap_or(DEFAULT_PAGE_LIMIT)
                .clamp(1, MAX_PAGE_LIMIT),
            offset: offset.unwrap_or(0).max(0),
            only_unread,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPage {
    pub items: Vec<NotificationRecord>,
    pub total: i64,
    pub unread_count: i64,
    pub limit: i64,
    pub offset: i64,
}
