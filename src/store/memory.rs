//! In-process store used by the test suites and local wiring without Postgres.
//!
//! One `MemoryStore` implements every store trait over a single mutex, so a
//! find-or-create is atomic the same way the unique index makes it atomic in
//! Postgres.

use super::{ConversationStore, MessageStore, NotificationStore, ReportDirectory};
use crate::error::{AppError, AppResult};
use crate::models::{
    Conversation, ConversationKey, ConversationSummary, Message, NewNotification,
    NotificationFilter, NotificationRecord, ReportRef,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    last_tick: Option<DateTime<Utc>>,
    next_conversation_id: i64,
    next_message_id: i64,
    next_notification_id: i64,
    conversations: BTreeMap<i64, Conversation>,
    messages: Vec<Message>,
    notifications: Vec<NotificationRecord>,
    reports: HashMap<i64, ReportRef>,
    users: HashMap<Uuid, String>,
    fail_notifications: bool,
}

impl Inner {
    /// Strictly increasing timestamps keep orderings deterministic in tests.
    fn tick(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_tick {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        self.last_tick = Some(now);
        now
    }

    fn find_by_key(&self, key: &ConversationKey) -> Option<&Conversation> {
        self.conversations.values().find(|c| {
            c.report_id == key.report_id
                && c.user1_id == key.owner_id
                && c.user2_id == key.participant_id
        })
    }

    fn summary_for(&self, conversation: &Conversation, user_id: Uuid) -> ConversationSummary {
        let other_user_id = conversation.other_participant(user_id);
        let in_conversation = || {
            self.messages
                .iter()
                .filter(move |m| m.conversation_id == conversation.conversation_id)
        };
        let last = in_conversation().max_by_key(|m| (m.created_at, m.message_id));
        let unread_count = in_conversation()
            .filter(|m| m.sender_id != user_id && !m.is_read)
            .count() as i64;

        ConversationSummary {
            conversation_id: conversation.conversation_id,
            report_id: conversation.report_id,
            report_title: self
                .reports
                .get(&conversation.report_id)
                .map(|r| r.title.clone())
                .unwrap_or_default(),
            other_user_id,
            other_user_name: self.users.get(&other_user_id).cloned().unwrap_or_default(),
            last_message_text: last.map(|m| m.message_text.clone()),
            last_message_at: last.map(|m| m.created_at),
            unread_count,
            updated_at: conversation.updated_at,
        }
    }

    fn notifications_for(
        &self,
        user_id: Uuid,
        only_unread: bool,
    ) -> impl Iterator<Item = &NotificationRecord> + '_ {
        self.notifications
            .iter()
            .filter(move |n| n.user_id == user_id && (!only_unread || !n.is_read))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user_id: Uuid, name: impl Into<String>) {
        self.inner.lock().await.users.insert(user_id, name.into());
    }

    pub async fn add_report(&self, report_id: i64, owner_id: Uuid, title: impl Into<String>) {
        self.inner.lock().await.reports.insert(
            report_id,
            ReportRef {
                report_id,
                owner_id,
                title: title.into(),
                status: "active".to_string(),
            },
        );
    }

    /// Make every notification insert fail with a database error.
    pub async fn set_notification_failure(&self, fail: bool) {
        self.inner.lock().await.fail_notifications = fail;
    }

    pub async fn conversation_count(&self) -> usize {
        self.inner.lock().await.conversations.len()
    }

    pub async fn message_count(&self, conversation_id: i64) -> usize {
        self.inner
            .lock()
            .await
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .count()
    }

    pub async fn notifications_of(&self, user_id: Uuid) -> Vec<NotificationRecord> {
        self.inner
            .lock()
            .await
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn find_by_id_for_user(
        &self,
        conversation_id: i64,
        user_id: Uuid,
    ) -> AppResult<Option<Conversation>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .conversations
            .get(&conversation_id)
            .filter(|c| c.has_participant(user_id))
            .cloned())
    }

    async fn find_or_create(&self, key: ConversationKey) -> AppResult<(Conversation, bool)> {
        if key.owner_id == key.participant_id {
            return Err(AppError::Database(
                "conversations_distinct_users check violated".to_string(),
            ));
        }

        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner.find_by_key(&key) {
            return Ok((existing.clone(), false));
        }

        let now = inner.tick();
        inner.next_conversation_id += 1;
        let conversation = Conversation {
            conversation_id: inner.next_conversation_id,
            report_id: key.report_id,
            user1_id: key.owner_id,
            user2_id: key.participant_id,
            created_at: now,
            updated_at: now,
        };
        inner
            .conversations
            .insert(conversation.conversation_id, conversation.clone());
        Ok((conversation, true))
    }

    async fn exists(&self, key: ConversationKey) -> AppResult<bool> {
        Ok(self.inner.lock().await.find_by_key(&key).is_some())
    }

    async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<ConversationSummary>> {
        let inner = self.inner.lock().await;
        let mut summaries: Vec<ConversationSummary> = inner
            .conversations
            .values()
            .filter(|c| c.has_participant(user_id))
            .map(|c| inner.summary_for(c, user_id))
            .collect();

        // None sorts after Some here because the key is (is_none, Reverse(..))
        summaries.sort_by_key(|s| {
            (
                s.last_message_at.is_none(),
                Reverse(s.last_message_at),
                Reverse(s.updated_at),
            )
        });
        Ok(summaries)
    }

    async fn touch(&self, conversation_id: i64) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        let now = inner.tick();
        if let Some(conversation) = inner.conversations.get_mut(&conversation_id) {
            conversation.updated_at = conversation.updated_at.max(now);
        }
        Ok(())
    }

    async fn delete(&self, conversation_id: i64) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        inner.messages.retain(|m| m.conversation_id != conversation_id);
        inner.conversations.remove(&conversation_id);
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create(&self, conversation_id: i64, sender_id: Uuid, text: &str) -> AppResult<Message> {
        let mut inner = self.inner.lock().await;
        let created_at = inner.tick();
        match inner.conversations.get_mut(&conversation_id) {
            Some(conversation) => conversation.updated_at = conversation.updated_at.max(created_at),
            None => {
                return Err(AppError::Database(
                    "messages_conversation_id_fkey violated".to_string(),
                ))
            }
        }

        inner.next_message_id += 1;
        let message = Message {
            message_id: inner.next_message_id,
            conversation_id,
            sender_id,
            message_text: text.to_string(),
            is_read: false,
            created_at,
        };
        inner.messages.push(message.clone());
        Ok(message)
    }

    async fn list_by_conversation(&self, conversation_id: i64) -> AppResult<Vec<Message>> {
        let inner = self.inner.lock().await;
        let mut messages: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| (m.created_at, m.message_id));
        Ok(messages)
    }

    async fn mark_read(&self, conversation_id: i64, reader_id: Uuid) -> AppResult<u64> {
        let mut inner = self.inner.lock().await;
        let mut updated = 0;
        for message in inner.messages.iter_mut().filter(|m| {
            m.conversation_id == conversation_id && m.sender_id != reader_id && !m.is_read
        }) {
            message.is_read = true;
            updated += 1;
        }
        Ok(updated)
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn create(&self, input: NewNotification) -> AppResult<NotificationRecord> {
        let mut inner = self.inner.lock().await;
        if inner.fail_notifications {
            return Err(AppError::Database("notifications insert failed".to_string()));
        }

        let created_at = inner.tick();
        inner.next_notification_id += 1;
        let record = NotificationRecord {
            notification_id: inner.next_notification_id,
            user_id: input.user_id,
            kind: input.kind,
            title: input.title,
            message: input.message,
            related_id: input.related_id,
            is_read: false,
            created_at,
        };
        inner.notifications.push(record.clone());
        Ok(record)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        filter: NotificationFilter,
    ) -> AppResult<Vec<NotificationRecord>> {
        let inner = self.inner.lock().await;
        let mut items: Vec<NotificationRecord> = inner
            .notifications_for(user_id, filter.only_unread)
            .cloned()
            .collect();
        items.sort_by_key(|n| Reverse((n.created_at, n.notification_id)));

        Ok(items
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn count_for_user(&self, user_id: Uuid, only_unread: bool) -> AppResult<i64> {
        let inner = self.inner.lock().await;
        Ok(inner.notifications_for(user_id, only_unread).count() as i64)
    }

    async fn mark_read(&self, notification_id: i64, user_id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(n) = inner
            .notifications
            .iter_mut()
            .find(|n| n.notification_id == notification_id && n.user_id == user_id)
        {
            n.is_read = true;
        }
        Ok(())
    }

    async fn mark_all_read(&self, user_id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == user_id)
            .for_each(|n| n.is_read = true);
        Ok(())
    }
}

#[async_trait]
impl ReportDirectory for MemoryStore {
    async fn get_report(&self, report_id: i64) -> AppResult<Option<ReportRef>> {
        Ok(self.inner.lock().await.reports.get(&report_id).cloned())
    }
}
