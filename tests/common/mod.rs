#![allow(dead_code)]

use actix_middleware::{AuthContext, Role, TokenVerifier};
use lostfound_chat_service::services::{ConversationService, NotificationService};
use lostfound_chat_service::state::{AppState, Stores};
use lostfound_chat_service::store::memory::MemoryStore;
use lostfound_chat_service::websocket::{Broadcaster, RecordingBroadcaster};
use std::sync::Arc;
use uuid::Uuid;

pub const SECRET: &str = "integration-test-secret-32-bytes!!";
pub const REPORT_ID: i64 = 42;

/// Services over one in-memory store, with every broadcast recorded
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub broadcaster: RecordingBroadcaster,
    pub conversations: Arc<ConversationService>,
    pub notifications: Arc<NotificationService>,
    pub owner: Uuid,
    pub finder: Uuid,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_broadcaster(RecordingBroadcaster::new()).await
    }

    pub async fn with_broadcaster(broadcaster: RecordingBroadcaster) -> Self {
        let store = Arc::new(MemoryStore::new());
        let owner = Uuid::new_v4();
        let finder = Uuid::new_v4();
        store.add_user(owner, "Ana Owner").await;
        store.add_user(finder, "Bruno Finder").await;
        store.add_report(REPORT_ID, owner, "Black backpack near the library").await;

        let shared: Arc<dyn Broadcaster> = Arc::new(broadcaster.clone());
        let stores = Stores::memory(store.clone());
        let notifications = Arc::new(NotificationService::new(stores.notifications, shared.clone()));
        let conversations = Arc::new(ConversationService::new(
            stores.conversations,
            stores.messages,
            stores.reports,
            notifications.clone(),
            shared,
        ));

        Self {
            store,
            broadcaster,
            conversations,
            notifications,
            owner,
            finder,
        }
    }
}

pub fn verifier() -> Arc<TokenVerifier> {
    Arc::new(TokenVerifier::new(SECRET))
}

pub fn token_for(user_id: Uuid, role: Role) -> String {
    TokenVerifier::new(SECRET)
        .issue(AuthContext::new(user_id, role), chrono::Duration::minutes(10))
        .expect("token")
}

/// App state over memory stores with the real connection registry
pub async fn app_state() -> (AppState, Arc<MemoryStore>, Uuid, Uuid) {
    let store = Arc::new(MemoryStore::new());
    let owner = Uuid::new_v4();
    let finder = Uuid::new_v4();
    store.add_user(owner, "Ana Owner").await;
    store.add_user(finder, "Bruno Finder").await;
    store.add_report(REPORT_ID, owner, "Black backpack near the library").await;

    (AppState::in_memory(store.clone(), verifier()), store, owner, finder)
}
