//! Dispatch of inbound realtime events, independent of the socket actor.

use super::message_types::{conversation_id, ClientEvent, ServerFrame};
use super::{Broadcaster, ConnectionId, ConnectionRegistry, Group};
use crate::metrics;
use crate::services::ConversationService;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

pub const CONVERSATION_READ_EVENT: &str = "conversation:read";

const JOIN_FAILED: &str = "Could not join the conversation";
const SEND_FAILED: &str = "Could not send the message";
const READ_FAILED: &str = "Could not mark the conversation as read";

/// One authenticated connection's view of the gateway.
#[derive(Clone)]
pub struct GatewaySession {
    pub connection_id: ConnectionId,
    pub user_id: Uuid,
    registry: ConnectionRegistry,
    conversations: Arc<ConversationService>,
}

impl GatewaySession {
    pub fn new(
        connection_id: ConnectionId,
        user_id: Uuid,
        registry: ConnectionRegistry,
        conversations: Arc<ConversationService>,
    ) -> Self {
        Self {
            connection_id,
            user_id,
            registry,
            conversations,
        }
    }

    /// Handle one raw text frame. Returns a frame meant only for this
    /// connection, if any.
    pub async fn handle_text(&self, text: &str) -> Option<String> {
        let event = match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(connection_id = %self.connection_id, error = %e, "ignoring realtime frame");
                return None;
            }
        };

        let reply = self.handle_event(event).await?;
        match reply.to_text() {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode reply frame");
                None
            }
        }
    }

    pub async fn handle_event(&self, event: ClientEvent) -> Option<ServerFrame> {
        metrics::ws_event_received(event.name());

        match event {
            ClientEvent::JoinConversation(payload) => {
                let id = conversation_id(payload.conversation_id)?;
                match self.conversations.authorize_participant(id, self.user_id).await {
                    Ok(_) => {
                        self.registry
                            .join(self.connection_id, Group::Conversation(id))
                            .await;
                        None
                    }
                    Err(e) => {
                        tracing::debug!(conversation_id = id, user_id = %self.user_id, error = %e, "join refused");
                        Some(ServerFrame::error(JOIN_FAILED))
                    }
                }
            }

            ClientEvent::LeaveConversation(payload) => {
                let id = conversation_id(payload.conversation_id)?;
                self.registry
                    .leave(self.connection_id, Group::Conversation(id))
                    .await;
                None
            }

            ClientEvent::SendMessage(payload) => {
                let id = conversation_id(payload.conversation_id)?;
                let text = payload.message_text.filter(|t| !t.is_empty())?;

                // message:new and the recipient notification go out from the service
                match self.conversations.send_message(id, self.user_id, &text).await {
                    Ok(_) => None,
                    Err(e) => {
                        tracing::debug!(conversation_id = id, user_id = %self.user_id, error = %e, "realtime send failed");
                        Some(ServerFrame::error(SEND_FAILED))
                    }
                }
            }

            ClientEvent::ReadConversation(payload) => {
                let id = conversation_id(payload.conversation_id)?;
                if let Err(e) = self
                    .conversations
                    .mark_conversation_as_read(id, self.user_id)
                    .await
                {
                    tracing::debug!(conversation_id = id, user_id = %self.user_id, error = %e, "realtime read failed");
                    return Some(ServerFrame::error(READ_FAILED));
                }

                let receipt = json!({ "conversation_id": id, "user_id": self.user_id });
                if let Err(e) = self
                    .registry
                    .to_conversation(id, CONVERSATION_READ_EVENT, receipt)
                    .await
                {
                    tracing::warn!(conversation_id = id, error = %e, "read receipt broadcast failed");
                }
                None
            }
        }
    }
}
