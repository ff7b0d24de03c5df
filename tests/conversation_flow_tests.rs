mod common;

use async_trait::async_trait;
use common::{Harness, REPORT_ID};
use futures::future::join_all;
use lostfound_chat_service::error::{AppError, AppResult};
use lostfound_chat_service::models::{
    Conversation, ConversationKey, ConversationSummary, Message, NotificationType,
};
use lostfound_chat_service::services::ConversationService;
use lostfound_chat_service::store::memory::MemoryStore;
use lostfound_chat_service::store::{ConversationStore, MessageStore};
use lostfound_chat_service::websocket::broadcaster::Target;
use lostfound_chat_service::websocket::Broadcaster;
use std::sync::Arc;
use uuid::Uuid;

/// Memory conversations whose standalone `touch` always fails
struct BrokenTouch(Arc<MemoryStore>);

#[async_trait]
impl ConversationStore for BrokenTouch {
    async fn find_by_id_for_user(&self, conversation_id: i64, user_id: Uuid) -> AppResult<Option<Conversation>> {
        self.0.find_by_id_for_user(conversation_id, user_id).await
    }

    async fn find_or_create(&self, key: ConversationKey) -> AppResult<(Conversation, bool)> {
        self.0.find_or_create(key).await
    }

    async fn exists(&self, key: ConversationKey) -> AppResult<bool> {
        self.0.exists(key).await
    }

    async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<ConversationSummary>> {
        ConversationStore::list_for_user(self.0.as_ref(), user_id).await
    }

    async fn touch(&self, _conversation_id: i64) -> AppResult<()> {
        Err(AppError::Database("connection reset".to_string()))
    }

    async fn delete(&self, conversation_id: i64) -> AppResult<()> {
        self.0.delete(conversation_id).await
    }
}

/// Message store whose insert transaction always rolls back
struct BrokenInsert;

#[async_trait]
impl MessageStore for BrokenInsert {
    async fn create(&self, _conversation_id: i64, _sender_id: Uuid, _text: &str) -> AppResult<Message> {
        Err(AppError::Database("insert rolled back".to_string()))
    }

    async fn list_by_conversation(&self, _conversation_id: i64) -> AppResult<Vec<Message>> {
        Ok(Vec::new())
    }

    async fn mark_read(&self, _conversation_id: i64, _reader_id: Uuid) -> AppResult<u64> {
        Ok(0)
    }
}

fn service_over(
    h: &Harness,
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
) -> ConversationService {
    let broadcaster: Arc<dyn Broadcaster> = Arc::new(h.broadcaster.clone());
    ConversationService::new(
        conversations,
        messages,
        h.store.clone(),
        h.notifications.clone(),
        broadcaster,
    )
}

#[tokio::test]
async fn concurrent_create_collapses_to_one_conversation() {
    let h = Harness::new().await;

    let attempts = (0..16).map(|_| h.conversations.create_or_get_conversation(REPORT_ID, h.finder));
    let results = join_all(attempts).await;

    let ids: Vec<i64> = results
        .into_iter()
        .map(|r| r.unwrap().conversation_id)
        .collect();
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(h.store.conversation_count().await, 1);

    // Only the creating call notifies the owner
    let owner_notifications = h.store.notifications_of(h.owner).await;
    assert_eq!(owner_notifications.len(), 1);
    assert_eq!(owner_notifications[0].related_id, Some(ids[0]));
}

#[tokio::test]
async fn canonical_pair_puts_owner_first() {
    let h = Harness::new().await;
    let conversation = h
        .conversations
        .create_or_get_conversation(REPORT_ID, h.finder)
        .await
        .unwrap();

    assert_eq!(conversation.user1_id, h.owner);
    assert_eq!(conversation.user2_id, h.finder);
    assert_eq!(conversation.report_id, REPORT_ID);
}

#[tokio::test]
async fn owner_cannot_open_conversation_on_own_report() {
    let h = Harness::new().await;

    let err = h
        .conversations
        .create_or_get_conversation(REPORT_ID, h.owner)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    assert_eq!(h.store.conversation_count().await, 0);

    let err = h
        .conversations
        .conversation_exists(REPORT_ID, h.owner)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn unknown_report_is_not_found() {
    let h = Harness::new().await;
    let err = h
        .conversations
        .create_or_get_conversation(9999, h.finder)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn exists_reflects_creation() {
    let h = Harness::new().await;
    assert!(!h.conversations.conversation_exists(REPORT_ID, h.finder).await.unwrap());

    h.conversations
        .create_or_get_conversation(REPORT_ID, h.finder)
        .await
        .unwrap();
    assert!(h.conversations.conversation_exists(REPORT_ID, h.finder).await.unwrap());
}

#[tokio::test]
async fn outsiders_get_not_found_whether_or_not_conversation_exists() {
    let h = Harness::new().await;
    let stranger = Uuid::new_v4();
    let conversation = h
        .conversations
        .create_or_get_conversation(REPORT_ID, h.finder)
        .await
        .unwrap();

    let existing = h
        .conversations
        .get_conversation_messages(conversation.conversation_id, stranger)
        .await
        .unwrap_err();
    let missing = h
        .conversations
        .get_conversation_messages(conversation.conversation_id + 100, stranger)
        .await
        .unwrap_err();

    assert!(matches!(existing, AppError::NotFound(_)));
    assert!(matches!(missing, AppError::NotFound(_)));
    assert_eq!(existing.to_string(), missing.to_string());

    let send = h
        .conversations
        .send_message(conversation.conversation_id, stranger, "let me in")
        .await
        .unwrap_err();
    assert!(matches!(send, AppError::NotFound(_)));
}

#[tokio::test]
async fn messages_come_back_in_send_order_verbatim() {
    let h = Harness::new().await;
    let conversation = h
        .conversations
        .create_or_get_conversation(REPORT_ID, h.finder)
        .await
        .unwrap();
    let id = conversation.conversation_id;

    let texts = ["first", "  second with spaces  ", "tercero, ¿sí? 🎒"];
    h.conversations.send_message(id, h.finder, texts[0]).await.unwrap();
    h.conversations.send_message(id, h.owner, texts[1]).await.unwrap();
    h.conversations.send_message(id, h.finder, texts[2]).await.unwrap();

    let history = h.conversations.get_conversation_messages(id, h.owner).await.unwrap();
    let got: Vec<&str> = history.iter().map(|m| m.message_text.as_str()).collect();
    assert_eq!(got, texts);
    assert!(history.windows(2).all(|w| w[0].message_id < w[1].message_id));
}

#[tokio::test]
async fn invalid_text_is_rejected_before_storage() {
    let h = Harness::new().await;
    let conversation = h
        .conversations
        .create_or_get_conversation(REPORT_ID, h.finder)
        .await
        .unwrap();

    let too_long = "x".repeat(2001);
    for text in ["", "   ", too_long.as_str()] {
        let err = h
            .conversations
            .send_message(conversation.conversation_id, h.finder, text)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
    assert_eq!(h.store.message_count(conversation.conversation_id).await, 0);
}

#[tokio::test]
async fn mark_read_is_idempotent_and_skips_own_messages() {
    let h = Harness::new().await;
    let conversation = h
        .conversations
        .create_or_get_conversation(REPORT_ID, h.finder)
        .await
        .unwrap();
    let id = conversation.conversation_id;

    h.conversations.send_message(id, h.finder, "is it yours?").await.unwrap();
    h.conversations.send_message(id, h.owner, "yes!").await.unwrap();

    h.conversations.mark_conversation_as_read(id, h.owner).await.unwrap();
    let once = h.store.list_by_conversation(id).await.unwrap();
    h.conversations.mark_conversation_as_read(id, h.owner).await.unwrap();
    let twice = h.store.list_by_conversation(id).await.unwrap();

    assert_eq!(once, twice);
    let read: Vec<(Uuid, bool)> = twice.iter().map(|m| (m.sender_id, m.is_read)).collect();
    assert_eq!(read, vec![(h.finder, true), (h.owner, false)]);
}

#[tokio::test]
async fn unread_count_only_counts_counterpart_messages() {
    let h = Harness::new().await;
    let conversation = h
        .conversations
        .create_or_get_conversation(REPORT_ID, h.finder)
        .await
        .unwrap();
    let id = conversation.conversation_id;

    for text in ["one", "two", "three"] {
        h.conversations.send_message(id, h.finder, text).await.unwrap();
    }
    for text in ["mine", "also mine"] {
        h.conversations.send_message(id, h.owner, text).await.unwrap();
    }

    let summaries = h.conversations.get_user_conversations(h.owner).await.unwrap();
    assert_eq!(summaries.len(), 1);
    let summary = &summaries[0];
    assert_eq!(summary.unread_count, 3);
    assert_eq!(summary.other_user_id, h.finder);
    assert_eq!(summary.other_user_name, "Bruno Finder");
    assert_eq!(summary.report_title, "Black backpack near the library");
    assert_eq!(summary.last_message_text.as_deref(), Some("also mine"));

    let finder_view = h.conversations.get_user_conversations(h.finder).await.unwrap();
    assert_eq!(finder_view[0].unread_count, 2);
    assert_eq!(finder_view[0].other_user_name, "Ana Owner");
}

#[tokio::test]
async fn send_message_relays_and_notifies_recipient() {
    let h = Harness::new().await;
    let conversation = h
        .conversations
        .create_or_get_conversation(REPORT_ID, h.finder)
        .await
        .unwrap();
    let id = conversation.conversation_id;

    let result = h.conversations.send_message(id, h.finder, "Hola").await.unwrap();
    assert_eq!(result.recipient_id, h.owner);
    assert_eq!(result.conversation.conversation_id, id);

    let relay: Vec<_> = h
        .broadcaster
        .sent()
        .await
        .into_iter()
        .filter(|b| b.event == "message:new")
        .collect();
    assert_eq!(relay.len(), 1);
    assert_eq!(relay[0].target, Target::ConversationAndUser(id, h.owner));
    assert_eq!(relay[0].payload["message_text"], "Hola");
    assert_eq!(relay[0].payload["message_id"], result.message.message_id);

    let notes = h.store.notifications_of(h.owner).await;
    let last = notes.last().unwrap();
    assert_eq!(last.kind, NotificationType::Message);
    assert_eq!(last.message.as_deref(), Some("Hola"));
    assert_eq!(last.related_id, Some(id));

    let owner_events = h.broadcaster.events_for_user(h.owner).await;
    assert!(owner_events.contains(&"notification:new".to_string()));
    assert!(owner_events.contains(&"notification:message".to_string()));
}

#[tokio::test]
async fn long_message_preview_is_truncated_in_notification_only() {
    let h = Harness::new().await;
    let conversation = h
        .conversations
        .create_or_get_conversation(REPORT_ID, h.finder)
        .await
        .unwrap();
    let long = "b".repeat(300);

    let result = h
        .conversations
        .send_message(conversation.conversation_id, h.finder, &long)
        .await
        .unwrap();
    assert_eq!(result.message.message_text, long);

    let preview = h.store.notifications_of(h.owner).await.pop().unwrap().message.unwrap();
    assert_eq!(preview, format!("{}...", "b".repeat(120)));
}

#[tokio::test]
async fn side_effect_failures_do_not_fail_send() {
    let h = Harness::with_broadcaster(
        lostfound_chat_service::websocket::RecordingBroadcaster::failing(),
    )
    .await;
    let conversation = h
        .conversations
        .create_or_get_conversation(REPORT_ID, h.finder)
        .await
        .unwrap();

    h.store.set_notification_failure(true).await;
    let result = h
        .conversations
        .send_message(conversation.conversation_id, h.finder, "still delivered")
        .await;

    assert!(result.is_ok());
    assert_eq!(h.store.message_count(conversation.conversation_id).await, 1);
}

#[tokio::test]
async fn deleted_conversation_is_gone_for_both_participants() {
    let h = Harness::new().await;
    let conversation = h
        .conversations
        .create_or_get_conversation(REPORT_ID, h.finder)
        .await
        .unwrap();
    let id = conversation.conversation_id;
    h.conversations.send_message(id, h.finder, "bye").await.unwrap();

    h.conversations.delete_conversation(id, h.finder).await.unwrap();

    for user in [h.owner, h.finder] {
        assert!(matches!(
            h.conversations.get_conversation_messages(id, user).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            h.conversations.send_message(id, user, "hello?").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            h.conversations.delete_conversation(id, user).await,
            Err(AppError::NotFound(_))
        ));
    }
    assert_eq!(h.store.message_count(id).await, 0);
    assert!(h.store.find_by_id_for_user(id, h.owner).await.unwrap().is_none());
}

#[tokio::test]
async fn conversation_list_orders_by_latest_activity() {
    let h = Harness::new().await;
    h.store.add_report(43, h.owner, "Blue umbrella").await;
    h.store.add_report(44, h.owner, "Calculator").await;

    let a = h.conversations.create_or_get_conversation(REPORT_ID, h.finder).await.unwrap();
    let b = h.conversations.create_or_get_conversation(43, h.finder).await.unwrap();
    let quiet = h.conversations.create_or_get_conversation(44, h.finder).await.unwrap();

    h.conversations.send_message(b.conversation_id, h.finder, "older").await.unwrap();
    h.conversations.send_message(a.conversation_id, h.finder, "newer").await.unwrap();

    let order: Vec<i64> = h
        .conversations
        .get_user_conversations(h.owner)
        .await
        .unwrap()
        .iter()
        .map(|s| s.conversation_id)
        .collect();
    assert_eq!(order, vec![a.conversation_id, b.conversation_id, quiet.conversation_id]);

    let touched = h.store.find_by_id_for_user(a.conversation_id, h.owner).await.unwrap().unwrap();
    assert!(touched.updated_at > a.updated_at);
}

#[tokio::test]
async fn send_does_not_depend_on_a_separate_touch() {
    let h = Harness::new().await;
    let conversation = h
        .conversations
        .create_or_get_conversation(REPORT_ID, h.finder)
        .await
        .unwrap();
    let service = service_over(&h, Arc::new(BrokenTouch(h.store.clone())), h.store.clone());

    let sent = service
        .send_message(conversation.conversation_id, h.finder, "Hola")
        .await
        .unwrap();

    assert_eq!(h.store.message_count(conversation.conversation_id).await, 1);
    assert!(h
        .broadcaster
        .events_for_user(h.owner)
        .await
        .contains(&"message:new".to_string()));

    let bumped = h
        .store
        .find_by_id_for_user(conversation.conversation_id, h.owner)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bumped.updated_at, sent.message.created_at);
}

#[tokio::test]
async fn failed_insert_leaves_no_trace() {
    let h = Harness::new().await;
    let conversation = h
        .conversations
        .create_or_get_conversation(REPORT_ID, h.finder)
        .await
        .unwrap();
    let before = h.broadcaster.sent().await.len();
    let service = service_over(&h, h.store.clone(), Arc::new(BrokenInsert));

    let result = service
        .send_message(conversation.conversation_id, h.finder, "Hola")
        .await;

    assert!(matches!(result, Err(AppError::Database(_))));
    assert_eq!(h.store.message_count(conversation.conversation_id).await, 0);
    assert_eq!(h.broadcaster.sent().await.len(), before);
    // Only the new-conversation notice
    assert_eq!(h.store.notifications_of(h.owner).await.len(), 1);

    let unchanged = h
        .store
        .find_by_id_for_user(conversation.conversation_id, h.owner)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unchanged.updated_at, conversation.updated_at);
}
