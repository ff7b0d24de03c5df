pub mod conversation_service;
pub mod notification_service;

pub use conversation_service::{ConversationService, SendMessageResult};
pub use notification_service::NotificationService;
