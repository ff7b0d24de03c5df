mod common;

use common::{app_state, REPORT_ID};
use lostfound_chat_service::state::AppState;
use lostfound_chat_service::websocket::handlers::GatewaySession;
use lostfound_chat_service::websocket::message_types::ServerFrame;
use lostfound_chat_service::websocket::Group;
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

struct Client {
    session: GatewaySession,
    rx: UnboundedReceiver<String>,
}

impl Client {
    async fn connect(state: &AppState, user_id: Uuid) -> Self {
        let (connection_id, rx) = state.registry.register(user_id).await;
        let session = GatewaySession::new(
            connection_id,
            user_id,
            state.registry.clone(),
            state.conversations.clone(),
        );
        Self { session, rx }
    }

    async fn send(&self, event: &str, data: serde_json::Value) -> Option<ServerFrame> {
        let text = json!({ "event": event, "data": data }).to_string();
        self.session
            .handle_text(&text)
            .await
            .map(|reply| serde_json::from_str(&reply).unwrap())
    }

    fn drain(&mut self) -> Vec<ServerFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            frames.push(serde_json::from_str(&frame).unwrap());
        }
        frames
    }
}

async fn conversation(state: &AppState, finder: Uuid) -> i64 {
    state
        .conversations
        .create_or_get_conversation(REPORT_ID, finder)
        .await
        .unwrap()
        .conversation_id
}

#[tokio::test]
async fn participant_joins_and_outsider_is_refused() {
    let (state, _store, owner, finder) = app_state().await;
    let id = conversation(&state, finder).await;

    let member = Client::connect(&state, owner).await;
    assert!(member
        .send("conversation:join", json!({ "conversation_id": id }))
        .await
        .is_none());
    assert!(
        state
            .registry
            .is_member(member.session.connection_id, Group::Conversation(id))
            .await
    );

    let outsider = Client::connect(&state, Uuid::new_v4()).await;
    let reply = outsider
        .send("conversation:join", json!({ "conversation_id": id }))
        .await
        .expect("error frame");
    assert_eq!(reply.event, "error");
    assert_eq!(reply.data["message"], "Could not join the conversation");
    assert!(
        !state
            .registry
            .is_member(outsider.session.connection_id, Group::Conversation(id))
            .await
    );
}

#[tokio::test]
async fn realtime_send_reaches_both_sides_once() {
    let (state, store, owner, finder) = app_state().await;
    let id = conversation(&state, finder).await;

    let mut owner_client = Client::connect(&state, owner).await;
    let mut finder_client = Client::connect(&state, finder).await;
    for client in [&owner_client, &finder_client] {
        client
            .send("conversation:join", json!({ "conversation_id": id }))
            .await;
    }
    owner_client.drain();

    let reply = finder_client
        .send(
            "message:send",
            json!({ "conversation_id": id, "message_text": "Is it the one with a red keychain?" }),
        )
        .await;
    assert!(reply.is_none());
    assert_eq!(store.message_count(id).await, 1);

    let owner_frames = owner_client.drain();
    let new_messages: Vec<_> = owner_frames
        .iter()
        .filter(|f| f.event == "message:new")
        .collect();
    assert_eq!(new_messages.len(), 1);
    assert_eq!(new_messages[0].data["conversation_id"], id);
    assert_eq!(new_messages[0].data["sender_id"], finder.to_string());
    assert_eq!(
        new_messages[0].data["message_text"],
        "Is it the one with a red keychain?"
    );
    assert!(owner_frames.iter().any(|f| f.event == "notification:new"));

    // The sender sees its own message through the conversation group
    let finder_frames = finder_client.drain();
    assert_eq!(
        finder_frames
            .iter()
            .filter(|f| f.event == "message:new")
            .count(),
        1
    );
    assert!(!finder_frames.iter().any(|f| f.event == "notification:new"));
}

#[tokio::test]
async fn recipient_outside_the_room_still_gets_the_message() {
    let (state, _store, owner, finder) = app_state().await;
    let id = conversation(&state, finder).await;

    let mut owner_client = Client::connect(&state, owner).await;
    let finder_client = Client::connect(&state, finder).await;

    finder_client
        .send(
            "message:send",
            json!({ "conversation_id": id, "message_text": "Hola" }),
        )
        .await;

    let frames = owner_client.drain();
    assert_eq!(frames.iter().filter(|f| f.event == "message:new").count(), 1);
}

#[tokio::test]
async fn invalid_realtime_send_returns_error_frame() {
    let (state, store, _owner, finder) = app_state().await;
    let id = conversation(&state, finder).await;
    let client = Client::connect(&state, finder).await;

    let reply = client
        .send(
            "message:send",
            json!({ "conversation_id": id, "message_text": "   " }),
        )
        .await
        .expect("error frame");
    assert_eq!(reply.event, "error");
    assert_eq!(reply.data["message"], "Could not send the message");

    let stranger = Client::connect(&state, Uuid::new_v4()).await;
    let reply = stranger
        .send(
            "message:send",
            json!({ "conversation_id": id, "message_text": "hello" }),
        )
        .await
        .expect("error frame");
    assert_eq!(reply.event, "error");
    assert_eq!(store.message_count(id).await, 0);
}

#[tokio::test]
async fn incomplete_and_unknown_events_are_ignored() {
    let (state, store, _owner, finder) = app_state().await;
    let id = conversation(&state, finder).await;
    let mut client = Client::connect(&state, finder).await;

    assert!(client.send("conversation:join", json!({})).await.is_none());
    assert!(client
        .send("conversation:join", json!({ "conversation_id": 0 }))
        .await
        .is_none());
    assert!(client
        .send("message:send", json!({ "conversation_id": id }))
        .await
        .is_none());
    assert!(client
        .send(
            "message:send",
            json!({ "conversation_id": id, "message_text": "" })
        )
        .await
        .is_none());
    assert!(client.send("typing:start", json!({ "conversation_id": id })).await.is_none());
    assert!(client.session.handle_text("not json").await.is_none());

    assert_eq!(store.message_count(id).await, 0);
    assert!(client.drain().is_empty());
}

#[tokio::test]
async fn read_event_marks_messages_and_sends_receipt() {
    let (state, _store, owner, finder) = app_state().await;
    let id = conversation(&state, finder).await;
    state
        .conversations
        .send_message(id, finder, "Found it at the front desk")
        .await
        .unwrap();

    let mut owner_client = Client::connect(&state, owner).await;
    let mut finder_client = Client::connect(&state, finder).await;
    for client in [&owner_client, &finder_client] {
        client
            .send("conversation:join", json!({ "conversation_id": id }))
            .await;
    }

    assert!(owner_client
        .send("conversation:read", json!({ "conversation_id": id }))
        .await
        .is_none());

    let summaries = state.conversations.get_user_conversations(owner).await.unwrap();
    assert_eq!(summaries[0].unread_count, 0);

    let receipts: Vec<_> = finder_client
        .drain()
        .into_iter()
        .filter(|f| f.event == "conversation:read")
        .collect();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].data["conversation_id"], id);
    assert_eq!(receipts[0].data["user_id"], owner.to_string());
    assert!(owner_client
        .drain()
        .iter()
        .any(|f| f.event == "conversation:read"));

    // Outsider cannot mark anything
    let outsider = Client::connect(&state, Uuid::new_v4()).await;
    let reply = outsider
        .send("conversation:read", json!({ "conversation_id": id }))
        .await
        .expect("error frame");
    assert_eq!(reply.data["message"], "Could not mark the conversation as read");
}

#[tokio::test]
async fn leaving_and_disconnecting_stop_delivery() {
    let (state, _store, owner, finder) = app_state().await;
    let id = conversation(&state, finder).await;

    let mut observer = Client::connect(&state, owner).await;
    observer
        .send("conversation:join", json!({ "conversation_id": id }))
        .await;
    observer
        .send("conversation:leave", json!({ "conversation_id": id }))
        .await;
    assert_eq!(state.registry.group_size(Group::Conversation(id)).await, 0);

    state
        .registry
        .unregister(observer.session.connection_id)
        .await;
    assert_eq!(state.registry.connection_count().await, 0);

    state
        .conversations
        .send_message(id, finder, "anyone there?")
        .await
        .unwrap();
    assert!(observer.drain().is_empty());
}
