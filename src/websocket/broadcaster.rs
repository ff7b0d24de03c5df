use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("broadcast transport unavailable: {0}")]
    Unavailable(String),
}

/// Push capability handed to the services.
///
/// Delivery is best effort: callers log a failure and carry on.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn to_user(&self, user_id: Uuid, event: &str, payload: Value) -> Result<(), BroadcastError>;

    async fn to_conversation(
        &self,
        conversation_id: i64,
        event: &str,
        payload: Value,
    ) -> Result<(), BroadcastError>;

    /// Conversation group plus one user's personal group. Transports that can
    /// should deliver once per connection that sits in both.
    async fn to_conversation_and_user(
        &self,
        conversation_id: i64,
        user_id: Uuid,
        event: &str,
        payload: Value,
    ) -> Result<(), BroadcastError> {
        self.to_conversation(conversation_id, event, payload.clone())
            .await?;
        self.to_user(user_id, event, payload).await
    }
}

/// Drops everything. For wiring without a realtime transport.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBroadcaster;

#[async_trait]
impl Broadcaster for NoopBroadcaster {
    async fn to_user(&self, _user_id: Uuid, _event: &str, _payload: Value) -> Result<(), BroadcastError> {
        Ok(())
    }

    async fn to_conversation(
        &self,
        _conversation_id: i64,
        _event: &str,
        _payload: Value,
    ) -> Result<(), BroadcastError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    User(Uuid),
    Conversation(i64),
    ConversationAndUser(i64, Uuid),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Broadcast {
    pub target: Target,
    pub event: String,
    pub payload: Value,
}

/// Keeps every broadcast in memory so tests can assert on them.
#[derive(Debug, Default, Clone)]
pub struct RecordingBroadcaster {
    sent: Arc<Mutex<Vec<Broadcast>>>,
    failing: bool,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records nothing and fails every call.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub async fn sent(&self) -> Vec<Broadcast> {
        self.sent.lock().await.clone()
    }

    pub async fn events_for_user(&self, user_id: Uuid) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|b| match b.target {
                Target::User(id) | Target::ConversationAndUser(_, id) => id == user_id,
                Target::Conversation(_) => false,
            })
            .map(|b| b.event.clone())
            .collect()
    }

    async fn record(&self, target: Target, event: &str, payload: Value) -> Result<(), BroadcastError> {
        if self.failing {
            return Err(BroadcastError::Unavailable("recording broadcaster set to fail".into()));
        }
        self.sent.lock().await.push(Broadcast {
            target,
            event: event.to_string(),
            payload,
        });
        Ok(())
    }
}

#[async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn to_user(&self, user_id: Uuid, event: &str, payload: Value) -> Result<(), BroadcastError> {
        self.record(Target::User(user_id), event, payload).await
    }

    async fn to_conversation(
        &self,
        conversation_id: i64,
        event: &str,
        payload: Value,
    ) -> Result<(), BroadcastError> {
        self.record(Target::Conversation(conversation_id), event, payload)
            .await
    }

    async fn to_conversation_and_user(
        &self,
        conversation_id: i64,
        user_id: Uuid,
        event: &str,
        payload: Value,
    ) -> Result<(), BroadcastError> {
        self.record(
            Target::ConversationAndUser(conversation_id, user_id),
            event,
            payload,
        )
        .await
    }
}
