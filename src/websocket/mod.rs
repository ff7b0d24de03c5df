use crate::metrics;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

pub mod broadcaster;
pub mod handlers;
pub mod message_types;

pub use broadcaster::{BroadcastError, Broadcaster, NoopBroadcaster, RecordingBroadcaster};
use message_types::ServerFrame;

/// Unique identifier for one realtime connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Broadcast group a connection can belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
    User(Uuid),
    Conversation(i64),
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Group::User(id) => write!(f, "user:{id}"),
            Group::Conversation(id) => write!(f, "conversation:{id}"),
        }
    }
}

struct Connection {
    user_id: Uuid,
    sender: UnboundedSender<String>,
    groups: HashSet<Group>,
}

#[derive(Default)]
struct RegistryInner {
    connections: HashMap<ConnectionId, Connection>,
    groups: HashMap<Group, HashSet<ConnectionId>>,
}

impl RegistryInner {
    fn remove_connection(&mut self, id: ConnectionId) -> Option<Connection> {
        let connection = self.connections.remove(&id)?;
        for group in &connection.groups {
            if let Some(members) = self.groups.get_mut(group) {
                members.remove(&id);
                if members.is_empty() {
                    self.groups.remove(group);
                }
            }
        }
        Some(connection)
    }
}

/// Process-local registry of realtime connections and their groups.
///
/// Each connection owns an unbounded channel of encoded frames; the session
/// actor drains it. Membership is dropped as a whole on `unregister`.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for `user_id` and enroll it in `user:{user_id}`.
    pub async fn register(&self, user_id: Uuid) -> (ConnectionId, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let id = ConnectionId::new();
        let personal = Group::User(user_id);

        let mut guard = self.inner.write().await;
        guard.connections.insert(
            id,
            Connection {
                user_id,
                sender: tx,
                groups: HashSet::from([personal]),
            },
        );
        guard.groups.entry(personal).or_default().insert(id);

        tracing::debug!(
            connection_id = %id,
            user_id = %user_id,
            connections = guard.connections.len(),
            "realtime connection registered"
        );
        (id, rx)
    }

    /// Returns false when the connection is no longer registered.
    pub async fn join(&self, id: ConnectionId, group: Group) -> bool {
        let mut guard = self.inner.write().await;
        match guard.connections.get_mut(&id) {
            Some(connection) => {
                connection.groups.insert(group);
            }
            None => return false,
        }
        guard.groups.entry(group).or_default().insert(id);
        tracing::debug!(connection_id = %id, group = %group, "joined group");
        true
    }

    pub async fn leave(&self, id: ConnectionId, group: Group) {
        let mut guard = self.inner.write().await;
        if let Some(connection) = guard.connections.get_mut(&id) {
            connection.groups.remove(&group);
        }
        if let Some(members) = guard.groups.get_mut(&group) {
            members.remove(&id);
            if members.is_empty() {
                guard.groups.remove(&group);
            }
        }
    }

    /// Drop the connection and every group membership it holds.
    pub async fn unregister(&self, id: ConnectionId) {
        let mut guard = self.inner.write().await;
        if let Some(connection) = guard.remove_connection(id) {
            tracing::debug!(
                connection_id = %id,
                user_id = %connection.user_id,
                groups = connection.groups.len(),
                "realtime connection unregistered"
            );
        }
    }

    /// Send one frame to every connection in any of `groups`, at most once
    /// per connection. Returns how many connections received it.
    pub async fn emit(&self, groups: &[Group], frame: &str) -> usize {
        let mut guard = self.inner.write().await;

        let targets: HashSet<ConnectionId> = groups
            .iter()
            .filter_map(|g| guard.groups.get(g))
            .flat_map(|members| members.iter().copied())
            .collect();

        let mut delivered = 0;
        let mut dead = Vec::new();
        for id in targets {
            match guard.connections.get(&id) {
                Some(connection) if connection.sender.send(frame.to_string()).is_ok() => {
                    delivered += 1;
                }
                _ => dead.push(id),
            }
        }

        if !dead.is_empty() {
            tracing::debug!(dead = dead.len(), "cleaning up closed realtime connections");
            for id in dead {
                guard.remove_connection(id);
            }
        }
        delivered
    }

    /// Send a frame to a single connection.
    pub async fn send_to(&self, id: ConnectionId, frame: &str) -> bool {
        let guard = self.inner.read().await;
        guard
            .connections
            .get(&id)
            .map(|c| c.sender.send(frame.to_string()).is_ok())
            .unwrap_or(false)
    }

    pub async fn group_size(&self, group: Group) -> usize {
        let guard = self.inner.read().await;
        guard.groups.get(&group).map(|m| m.len()).unwrap_or(0)
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    pub async fn is_member(&self, id: ConnectionId, group: Group) -> bool {
        let guard = self.inner.read().await;
        guard
            .connections
            .get(&id)
            .map(|c| c.groups.contains(&group))
            .unwrap_or(false)
    }

    async fn emit_event(&self, groups: &[Group], event: &str, payload: Value) -> Result<(), BroadcastError> {
        let frame = ServerFrame::new(event, payload).to_text()?;
        let delivered = self.emit(groups, &frame).await;
        metrics::ws_event_sent(event);
        tracing::debug!(event, delivered, "realtime event emitted");
        Ok(())
    }
}

#[async_trait]
impl Broadcaster for ConnectionRegistry {
    async fn to_user(&self, user_id: Uuid, event: &str, payload: Value) -> Result<(), BroadcastError> {
        self.emit_event(&[Group::User(user_id)], event, payload).await
    }

    async fn to_conversation(
        &self,
        conversation_id: i64,
        event: &str,
        payload: Value,
    ) -> Result<(), BroadcastError> {
        self.emit_event(&[Group::Conversation(conversation_id)], event, payload)
            .await
    }

    async fn to_conversation_and_user(
        &self,
        conversation_id: i64,
        user_id: Uuid,
        event: &str,
        payload: Value,
    ) -> Result<(), BroadcastError> {
        self.emit_event(
            &[Group::Conversation(conversation_id), Group::User(user_id)],
            event,
            payload,
        )
        .await
    }
}
