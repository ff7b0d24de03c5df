use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events a connected client may send.
///
/// Frames look like `{"event": "message:send", "data": {...}}`. Payload
/// fields are optional so a frame with a missing field still parses and
/// can be dropped quietly by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "conversation:join")]
    JoinConversation(ConversationPayload),

    #[serde(rename = "conversation:leave")]
    LeaveConversation(ConversationPayload),

    #[serde(rename = "message:send")]
    SendMessage(SendMessagePayload),

    #[serde(rename = "conversation:read")]
    ReadConversation(ConversationPayload),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinConversation(_) => "conversation:join",
            ClientEvent::LeaveConversation(_) => "conversation:leave",
            ClientEvent::SendMessage(_) => "message:send",
            ClientEvent::ReadConversation(_) => "conversation:read",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConversationPayload {
    #[serde(default)]
    pub conversation_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SendMessagePayload {
    #[serde(default)]
    pub conversation_id: Option<i64>,
    #[serde(default)]
    pub message_text: Option<String>,
}

/// Usable conversation id: present and positive.
pub fn conversation_id(raw: Option<i64>) -> Option<i64> {
    raw.filter(|id| *id > 0)
}

/// Server to client frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerFrame {
    pub event: String,
    pub data: Value,
}

impl ServerFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new("error", serde_json::json!({ "message": message.into() }))
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
