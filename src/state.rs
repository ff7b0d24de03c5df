use crate::{
    config::WsConfig,
    services::{ConversationService, NotificationService},
    store::{
        memory::MemoryStore,
        postgres::{PgConversationStore, PgMessageStore, PgNotificationStore, PgReportDirectory},
        ConversationStore, MessageStore, NotificationStore, ReportDirectory,
    },
    websocket::{Broadcaster, ConnectionRegistry},
};
use actix_middleware::TokenVerifier;
use deadpool_postgres::Pool;
use std::sync::Arc;
use std::time::Instant;

/// Store handles a service instance is assembled from
pub struct Stores {
    pub conversations: Arc<dyn ConversationStore>,
    pub messages: Arc<dyn MessageStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub reports: Arc<dyn ReportDirectory>,
}

impl Stores {
    pub fn postgres(pool: &Pool) -> Self {
        Self {
            conversations: Arc::new(PgConversationStore::new(pool.clone())),
            messages: Arc::new(PgMessageStore::new(pool.clone())),
            notifications: Arc::new(PgNotificationStore::new(pool.clone())),
            reports: Arc::new(PgReportDirectory::new(pool.clone())),
        }
    }

    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            conversations: store.clone(),
            messages: store.clone(),
            notifications: store.clone(),
            reports: store,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub conversations: Arc<ConversationService>,
    pub notifications: Arc<NotificationService>,
    pub registry: ConnectionRegistry,
    pub verifier: Arc<TokenVerifier>,
    pub ws: WsConfig,
    /// Absent when running on in-memory stores
    pub db: Option<Pool>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire both services to `stores`, pushing through `broadcaster`.
    pub fn assemble(
        stores: Stores,
        registry: ConnectionRegistry,
        broadcaster: Arc<dyn Broadcaster>,
        verifier: Arc<TokenVerifier>,
        ws: WsConfig,
        db: Option<Pool>,
    ) -> Self {
        let notifications = Arc::new(NotificationService::new(
            stores.notifications,
            broadcaster.clone(),
        ));
        let conversations = Arc::new(ConversationService::new(
            stores.conversations,
            stores.messages,
            stores.reports,
            notifications.clone(),
            broadcaster,
        ));

        Self {
            conversations,
            notifications,
            registry,
            verifier,
            ws,
            db,
            started_at: Instant::now(),
        }
    }

    /// Production wiring: Postgres stores and the live connection registry.
    pub fn with_postgres(pool: Pool, verifier: Arc<TokenVerifier>, ws: WsConfig) -> Self {
        let registry = ConnectionRegistry::new();
        Self::assemble(
            Stores::postgres(&pool),
            registry.clone(),
            Arc::new(registry),
            verifier,
            ws,
            Some(pool),
        )
    }

    pub fn in_memory(store: Arc<MemoryStore>, verifier: Arc<TokenVerifier>) -> Self {
        let registry = ConnectionRegistry::new();
        Self::assemble(
            Stores::memory(store),
            registry.clone(),
            Arc::new(registry),
            verifier,
            WsConfig::default(),
            None,
        )
    }
}
