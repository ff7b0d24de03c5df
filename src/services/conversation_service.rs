use crate::error::{AppError, AppResult};
use crate::models::{
    validate_message_text, Conversation, ConversationKey, ConversationSummary, Message,
    NewNotification, NotificationType, ReportRef,
};
use crate::services::NotificationService;
use crate::store::{ConversationStore, MessageStore, ReportDirectory};
use crate::websocket::Broadcaster;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

pub const MESSAGE_NEW_EVENT: &str = "message:new";

pub const NEW_CONVERSATION_TITLE: &str = "New conversation";
pub const NEW_MESSAGE_TITLE: &str = "New message";

const REPORT_TITLE_PREVIEW_CHARS: usize = 80;
const MESSAGE_PREVIEW_CHARS: usize = 120;

const REPORT_NOT_FOUND: &str = "Report not found";
const CONVERSATION_NOT_FOUND: &str = "Conversation not found";
const SELF_CONVERSATION: &str = "You cannot start a conversation about your own report";

/// Cut `text` to at most `max_chars` characters, appending `...` when cut.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SendMessageResult {
    pub message: Message,
    pub conversation: Conversation,
    pub recipient_id: Uuid,
}

/// Conversation lifecycle, message delivery and read state.
///
/// "Missing" and "not a participant" both surface as the same NotFound so
/// outsiders learn nothing about which conversations exist.
pub struct ConversationService {
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
    reports: Arc<dyn ReportDirectory>,
    notifications: Arc<NotificationService>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl ConversationService {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
        reports: Arc<dyn ReportDirectory>,
        notifications: Arc<NotificationService>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            conversations,
            messages,
            reports,
            notifications,
            broadcaster,
        }
    }

    /// The report, unless it is missing or owned by the requester.
    async fn report_for_requester(&self, report_id: i64, requester_id: Uuid) -> AppResult<ReportRef> {
        let report = self
            .reports
            .get_report(report_id)
            .await?
            .ok_or_else(|| AppError::NotFound(REPORT_NOT_FOUND.to_string()))?;

        if report.owner_id == requester_id {
            return Err(AppError::Forbidden(SELF_CONVERSATION.to_string()));
        }
        Ok(report)
    }

    /// Idempotent: the first call creates the conversation and notifies the
    /// report owner, later calls return the same row.
    pub async fn create_or_get_conversation(
        &self,
        report_id: i64,
        requester_id: Uuid,
    ) -> AppResult<Conversation> {
        let report = self.report_for_requester(report_id, requester_id).await?;
        let key = ConversationKey::new(report_id, report.owner_id, requester_id);
        let (conversation, created) = self.conversations.find_or_create(key).await?;

        if created {
            tracing::info!(
                conversation_id = conversation.conversation_id,
                report_id,
                "conversation created"
            );
            let notification = NewNotification {
                user_id: report.owner_id,
                kind: NotificationType::Message,
                title: NEW_CONVERSATION_TITLE.to_string(),
                message: Some(format!(
                    "Someone wants to talk about your report \"{}\"",
                    truncate_with_ellipsis(&report.title, REPORT_TITLE_PREVIEW_CHARS)
                )),
                related_id: Some(conversation.conversation_id),
            };
            self.notify_best_effort(notification).await;
        }

        Ok(conversation)
    }

    pub async fn conversation_exists(&self, report_id: i64, requester_id: Uuid) -> AppResult<bool> {
        let report = self.report_for_requester(report_id, requester_id).await?;
        self.conversations
            .exists(ConversationKey::new(report_id, report.owner_id, requester_id))
            .await
    }

    pub async fn get_user_conversations(&self, user_id: Uuid) -> AppResult<Vec<ConversationSummary>> {
        self.conversations.list_for_user(user_id).await
    }

    /// The conversation, if `user_id` is one of its two participants.
    pub async fn authorize_participant(
        &self,
        conversation_id: i64,
        user_id: Uuid,
    ) -> AppResult<Conversation> {
        self.conversations
            .find_by_id_for_user(conversation_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(CONVERSATION_NOT_FOUND.to_string()))
    }

    /// Full history, oldest first.
    pub async fn get_conversation_messages(
        &self,
        conversation_id: i64,
        user_id: Uuid,
    ) -> AppResult<Vec<Message>> {
        self.authorize_participant(conversation_id, user_id).await?;
        self.messages.list_by_conversation(conversation_id).await
    }

    pub async fn send_message(
        &self,
        conversation_id: i64,
        sender_id: Uuid,
        text: &str,
    ) -> AppResult<SendMessageResult> {
        let text = validate_message_text(text)?;
        let conversation = self.authorize_participant(conversation_id, sender_id).await?;

        // Insert and the updated_at bump commit together
        let message = self
            .messages
            .create(conversation_id, sender_id, &text)
            .await?;

        let recipient_id = conversation.other_participant(sender_id);

        let payload = json!({
            "conversation_id": message.conversation_id,
            "message_id": message.message_id,
            "sender_id": message.sender_id,
            "message_text": message.message_text,
            "created_at": message.created_at,
        });
        if let Err(e) = self
            .broadcaster
            .to_conversation_and_user(conversation_id, recipient_id, MESSAGE_NEW_EVENT, payload)
            .await
        {
            tracing::warn!(
                conversation_id,
                message_id = message.message_id,
                error = %e,
                "message relay failed"
            );
        }

        self.notify_best_effort(NewNotification {
            user_id: recipient_id,
            kind: NotificationType::Message,
            title: NEW_MESSAGE_TITLE.to_string(),
            message: Some(truncate_with_ellipsis(&message.message_text, MESSAGE_PREVIEW_CHARS)),
            related_id: Some(conversation_id),
        })
        .await;

        Ok(SendMessageResult {
            message,
            conversation,
            recipient_id,
        })
    }

    /// Marks the counterpart's messages as read. Repeating it changes nothing.
    pub async fn mark_conversation_as_read(&self, conversation_id: i64, user_id: Uuid) -> AppResult<()> {
        self.authorize_participant(conversation_id, user_id).await?;
        let updated = self.messages.mark_read(conversation_id, user_id).await?;
        tracing::debug!(conversation_id, user_id = %user_id, updated, "conversation marked read");
        Ok(())
    }

    /// Either participant may delete; the other side is not told.
    pub async fn delete_conversation(&self, conversation_id: i64, user_id: Uuid) -> AppResult<()> {
        self.authorize_participant(conversation_id, user_id).await?;
        self.conversations.delete(conversation_id).await?;
        tracing::info!(conversation_id, user_id = %user_id, "conversation deleted");
        Ok(())
    }

    // The primary mutation is already committed when this runs.
    async fn notify_best_effort(&self, input: NewNotification) {
        let user_id = input.user_id;
        if let Err(e) = self.notifications.notify_user(input).await {
            tracing::warn!(user_id = %user_id, error = %e, "failed to record notification");
        }
    }
}
