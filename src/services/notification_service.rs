use crate::error::AppResult;
use crate::models::{NewNotification, NotificationFilter, NotificationPage, NotificationRecord};
use crate::store::NotificationStore;
use crate::websocket::Broadcaster;
use std::sync::Arc;
use uuid::Uuid;

pub const NOTIFICATION_NEW_EVENT: &str = "notification:new";

/// Persists notifications and pushes them to the recipient's live sessions.
pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn NotificationStore>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self { store, broadcaster }
    }

    /// Store the notification, then emit `notification:new` and
    /// `notification:{type}` to `user:{id}`. Push failures are only logged.
    pub async fn notify_user(&self, input: NewNotification) -> AppResult<NotificationRecord> {
        let record = self.store.create(input).await?;

        let payload = match serde_json::to_value(&record) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(notification_id = record.notification_id, error = %e, "failed to encode notification");
                return Ok(record);
            }
        };

        for event in [NOTIFICATION_NEW_EVENT.to_string(), record.kind.event_name()] {
            if let Err(e) = self
                .broadcaster
                .to_user(record.user_id, &event, payload.clone())
                .await
            {
                tracing::warn!(
                    user_id = %record.user_id,
                    notification_id = record.notification_id,
                    event = %event,
                    error = %e,
                    "notification broadcast failed"
                );
            }
        }

        Ok(record)
    }

    pub async fn list_user_notifications(
        &self,
        user_id: Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
        only_unread: bool,
    ) -> AppResult<NotificationPage> {
        let filter = NotificationFilter::clamped(limit, offset, only_unread);

        let (items, total, unread_count) = futures::try_join!(
            self.store.list_for_user(user_id, filter),
            self.store.count_for_user(user_id, filter.only_unread),
            self.store.count_for_user(user_id, true),
        )?;

        Ok(NotificationPage {
            items,
            total,
            unread_count,
            limit: filter.limit,
            offset: filter.offset,
        })
    }

    pub async fn mark_notification_as_read(&self, user_id: Uuid, notification_id: i64) -> AppResult<()> {
        self.store.mark_read(notification_id, user_id).await
    }

    pub async fn mark_all_notifications_as_read(&self, user_id: Uuid) -> AppResult<()> {
        self.store.mark_all_read(user_id).await
    }
}
