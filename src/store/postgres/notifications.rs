use super::{db_error, pool_error};
use crate::error::{AppError, AppResult};
use crate::models::{NewNotification, NotificationFilter, NotificationRecord, NotificationType};
use crate::store::NotificationStore;
use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

pub struct PgNotificationStore {
    pool: Pool,
}

impl PgNotificationStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn notification_from_row(row: &Row) -> AppResult<NotificationRecord> {
    let kind: String = row.get("type");
    let kind: NotificationType = kind.parse().map_err(AppError::Database)?;

    Ok(NotificationRecord {
        notification_id: row.get("notification_id"),
        user_id: row.get("user_id"),
        kind,
        title: row.get("title"),
        message: row.get("message"),
        related_id: row.get("related_id"),
        is_read: row.get("is_read"),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn create(&self, input: NewNotification) -> AppResult<NotificationRecord> {
        let client = self.pool.get().await.map_err(pool_error)?;
        let row = client
            .query_one(
                r#"
                INSERT INTO notifications (user_id, type, title, message, related_id)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING notification_id, user_id, type, title, message, related_id, is_read, created_at
                "#,
                &[
                    &input.user_id,
                    &input.kind.as_str(),
                    &input.title,
                    &input.message,
                    &input.related_id,
                ],
            )
            .await
            .map_err(db_error("insert_notification"))?;

        notification_from_row(&row)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        filter: NotificationFilter,
    ) -> AppResult<Vec<NotificationRecord>> {
        let client = self.pool.get().await.map_err(pool_error)?;
        let rows = client
            .query(
                r#"
                SELECT notification_id, user_id, type, title, message, related_id, is_read, created_at
                FROM notifications
                WHERE user_id = $1
                  AND ($2::BOOLEAN = FALSE OR NOT is_read)
                ORDER BY created_at DESC, notification_id DESC
                LIMIT $3 OFFSET $4
                "#,
                &[&user_id, &filter.only_unread, &filter.limit, &filter.offset],
            )
            .await
            .map_err(db_error("list_notifications"))?;

        rows.iter().map(notification_from_row).collect()
    }

    async fn count_for_user(&self, user_id: Uuid, only_unread: bool) -> AppResult<i64> {
        let client = self.pool.get().await.map_err(pool_error)?;
        let row = client
            .query_one(
                r#"
                SELECT COUNT(*) AS total
                FROM notifications
                WHERE user_id = $1
                  AND ($2::BOOLEAN = FALSE OR NOT is_read)
                "#,
                &[&user_id, &only_unread],
            )
            .await
            .map_err(db_error("count_notifications"))?;

        Ok(row.get("total"))
    }

    async fn mark_read(&self, notification_id: i64, user_id: Uuid) -> AppResult<()> {
        let client = self.pool.get().await.map_err(pool_error)?;
        client
            .execute(
                "UPDATE notifications SET is_read = TRUE WHERE notification_id = $1 AND user_id = $2",
                &[&notification_id, &user_id],
            )
            .await
            .map_err(db_error("mark_notification_read"))?;
        Ok(())
    }

    async fn mark_all_read(&self, user_id: Uuid) -> AppResult<()> {
        let client = self.pool.get().await.map_err(pool_error)?;
        let updated = client
            .execute(
                "UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND NOT is_read",
                &[&user_id],
            )
            .await
            .map_err(db_error("mark_all_notifications_read"))?;

        tracing::debug!(user_id = %user_id, updated, "notifications marked read");
        Ok(())
    }
}
