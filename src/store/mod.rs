//! Persistence seams.
//!
//! Services only see these traits. `postgres` backs the running service and
//! `memory` backs the test suites.

pub mod memory;
pub mod postgres;

use crate::error::AppResult;
use crate::models::{
    Conversation, ConversationKey, ConversationSummary, Message, NewNotification,
    NotificationFilter, NotificationRecord, ReportRef,
};
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Only returns the conversation when `user_id` participates in it.
    async fn find_by_id_for_user(
        &self,
        conversation_id: i64,
        user_id: Uuid,
    ) -> AppResult<Option<Conversation>>;

    /// Returns the canonical row for `key` and whether this call created it.
    /// Concurrent calls for the same key all observe the same row.
    async fn find_or_create(&self, key: ConversationKey) -> AppResult<(Conversation, bool)>;

    async fn exists(&self, key: ConversationKey) -> AppResult<bool>;

    /// Conversations without messages sort last; the rest by latest
    /// message, then `updated_at`, both descending.
    async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<ConversationSummary>>;

    async fn touch(&self, conversation_id: i64) -> AppResult<()>;

    /// Removes the conversation together with its messages.
    async fn delete(&self, conversation_id: i64) -> AppResult<()>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Inserts the message and bumps the conversation's `updated_at` in the
    /// same transaction.
    async fn create(&self, conversation_id: i64, sender_id: Uuid, text: &str) -> AppResult<Message>;

    /// Ascending by `(created_at, message_id)`.
    async fn list_by_conversation(&self, conversation_id: i64) -> AppResult<Vec<Message>>;

    /// Marks the counterpart's unread messages as read; returns rows changed.
    async fn mark_read(&self, conversation_id: i64, reader_id: Uuid) -> AppResult<u64>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create(&self, input: NewNotification) -> AppResult<NotificationRecord>;

    /// Newest first.
    async fn list_for_user(
        &self,
        user_id: Uuid,
        filter: NotificationFilter,
    ) -> AppResult<Vec<NotificationRecord>>;

    async fn count_for_user(&self, user_id: Uuid, only_unread: bool) -> AppResult<i64>;

    /// Silent no-op when the notification is missing or belongs to someone else.
    async fn mark_read(&self, notification_id: i64, user_id: Uuid) -> AppResult<()>;

    async fn mark_all_read(&self, user_id: Uuid) -> AppResult<()>;
}

/// Read access to reports owned by the report service
#[async_trait]
pub trait ReportDirectory: Send + Sync {
    async fn get_report(&self, report_id: i64) -> AppResult<Option<ReportRef>>;
}
