use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

pub const MAX_MESSAGE_CHARS: u64 = 2000;

/// Message struct matching the `messages` table. Messages are never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub conversation_id: i64,
    pub sender_id: Uuid,
    pub message_text: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST .../messages`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[serde(default)]
    #[validate(
        length(
            min = 1,
            max = 2000,
            message = "message_text must be between 1 and 2000 characters"
        ),
        custom(function = "not_blank")
    )]
    pub message_text: String,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("message_text cannot be blank".into());
        return Err(err);
    }
    Ok(())
}

/// Check message text for HTTP and realtime senders alike.
/// Accepted text is returned untouched.
pub fn validate_message_text(text: &str) -> Result<String, ValidationErrors> {
    let req = SendMessageRequest {
        message_text: text.to_string(),
    };
    req.validate()?;
    Ok(req.message_text)
}
