pub mod conversation;
pub mod message;
pub mod notification;
pub mod report;

pub use conversation::{Conversation, ConversationKey, ConversationSummary};
pub use message::{validate_message_text, Message, SendMessageRequest, MAX_MESSAGE_CHARS};
pub use notification::{
    NewNotification, NotificationFilter, NotificationPage, NotificationRecord, NotificationType,
};
pub use report::ReportRef;
