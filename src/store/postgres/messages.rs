use super::{db_error, pool_error};
use crate::error::AppResult;
use crate::models::Message;
use crate::store::MessageStore;
use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

pub struct PgMessageStore {
    pool: Pool,
}

impl PgMessageStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn message_from_row(row: &Row) -> Message {
    Message {
        message_id: row.get("message_id"),
        conversation_id: row.get("conversation_id"),
        sender_id: row.get("sender_id"),
        message_text: row.get("message_text"),
        is_read: row.get("is_read"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn create(&self, conversation_id: i64, sender_id: Uuid, text: &str) -> AppResult<Message> {
        let mut client = self.pool.get().await.map_err(pool_error)?;
        let tx = client
            .transaction()
            .await
            .map_err(db_error("begin_insert_message"))?;

        let row = tx
            .query_one(
                r#"
                INSERT INTO messages (conversation_id, sender_id, message_text)
                VALUES ($1, $2, $3)
                RETURNING message_id, conversation_id, sender_id, message_text, is_read, created_at
                "#,
                &[&conversation_id, &sender_id, &text],
            )
            .await
            .map_err(db_error("insert_message"))?;
        tx.execute(
            "UPDATE conversations SET updated_at = GREATEST(updated_at, NOW()) WHERE conversation_id = $1",
            &[&conversation_id],
        )
        .await
        .map_err(db_error("touch_conversation"))?;

        tx.commit().await.map_err(db_error("commit_insert_message"))?;
        Ok(message_from_row(&row))
    }

    async fn list_by_conversation(&self, conversation_id: i64) -> AppResult<Vec<Message>> {
        let client = self.pool.get().await.map_err(pool_error)?;
        let rows = client
            .query(
                r#"
                SELECT message_id, conversation_id, sender_id, message_text, is_read, created_at
                FROM messages
                WHERE conversation_id = $1
                ORDER BY created_at ASC, message_id ASC
                "#,
                &[&conversation_id],
            )
            .await
            .map_err(db_error("list_messages"))?;

        Ok(rows.iter().map(message_from_row).collect())
    }

    async fn mark_read(&self, conversation_id: i64, reader_id: Uuid) -> AppResult<u64> {
        let client = self.pool.get().await.map_err(pool_error)?;
        let updated = client
            .execute(
                r#"
                UPDATE messages
                SET is_read = TRUE
                WHERE conversation_id = $1
                  AND sender_id <> $2
                  AND NOT is_read
                "#,
                &[&conversation_id, &reader_id],
            )
            .await
            .map_err(db_error("mark_messages_read"))?;

        Ok(updated)
    }
}
