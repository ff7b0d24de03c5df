use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One conversation per (report, owner, counterparty).
///
/// `user1_id` is always the report owner at creation time and `user2_id` the
/// user who reached out; the pair is never stored in caller order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: i64,
    pub report_id: i64,
    pub user1_id: Uuid,
    pub user2_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.user1_id == user_id || self.user2_id == user_id
    }

    /// The participant that is not `user_id`.
    pub fn other_participant(&self, user_id: Uuid) -> Uuid {
        if self.user1_id == user_id {
            self.user2_id
        } else {
            self.user1_id
        }
    }
}

/// Canonical identity of a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub report_id: i64,
    pub owner_id: Uuid,
    pub participant_id: Uuid,
}

impl ConversationKey {
    pub fn new(report_id: i64, owner_id: Uuid, participant_id: Uuid) -> Self {
        Self {
            report_id,
            owner_id,
            participant_id,
        }
    }
}

/// Per-user projection used by the conversation list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: i64,
    pub report_id: i64,
    pub report_title: String,
    pub other_user_id: Uuid,
    pub other_user_name: String,
    pub last_message_text: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: i64,
    pub updated_at: DateTime<Utc>,
}
