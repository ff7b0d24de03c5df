use super::{db_error, pool_error};
use crate::error::{AppError, AppResult};
use crate::models::{Conversation, ConversationKey, ConversationSummary};
use crate::store::ConversationStore;
use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::error::SqlState;
use tokio_postgres::Row;
use uuid::Uuid;

/// Attempts at insert-or-read before giving up on a key that keeps
/// being created and deleted underneath us.
const FIND_OR_CREATE_ATTEMPTS: usize = 3;

pub struct PgConversationStore {
    pool: Pool,
}

impl PgConversationStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn conversation_from_row(row: &Row) -> Conversation {
    Conversation {
        conversation_id: row.get("conversation_id"),
        report_id: row.get("report_id"),
        user1_id: row.get("user1_id"),
        user2_id: row.get("user2_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn summary_from_row(row: &Row) -> ConversationSummary {
    ConversationSummary {
        conversation_id: row.get("conversation_id"),
        report_id: row.get("report_id"),
        report_title: row.get("report_title"),
        other_user_id: row.get("other_user_id"),
        other_user_name: row.get("other_user_name"),
        last_message_text: row.get("last_message_text"),
        last_message_at: row.get("last_message_at"),
        unread_count: row.get("unread_count"),
        updated_at: row.get("updated_at"),
    }
}

fn is_unique_violation(err: &tokio_postgres::Error) -> bool {
    err.code() == Some(&SqlState::UNIQUE_VIOLATION)
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn find_by_id_for_user(
        &self,
        conversation_id: i64,
        user_id: Uuid,
    ) -> AppResult<Option<Conversation>> {
        let client = self.pool.get().await.map_err(pool_error)?;
        let row = client
            .query_opt(
                r#"
                SELECT conversation_id, report_id, user1_id, user2_id, created_at, updated_at
                FROM conversations
                WHERE conversation_id = $1
                  AND (user1_id = $2 OR user2_id = $2)
                "#,
                &[&conversation_id, &user_id],
            )
            .await
            .map_err(db_error("find_conversation_for_user"))?;

        Ok(row.as_ref().map(conversation_from_row))
    }

    async fn find_or_create(&self, key: ConversationKey) -> AppResult<(Conversation, bool)> {
        let client = self.pool.get().await.map_err(pool_error)?;

        for attempt in 1..=FIND_OR_CREATE_ATTEMPTS {
            let inserted = client
                .query_opt(
                    r#"
                    INSERT INTO conversations (report_id, user1_id, user2_id)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (report_id, user1_id, user2_id) DO NOTHING
                    RETURNING conversation_id, report_id, user1_id, user2_id, created_at, updated_at
                    "#,
                    &[&key.report_id, &key.owner_id, &key.participant_id],
                )
                .await;

            match inserted {
                Ok(Some(row)) => return Ok((conversation_from_row(&row), true)),
                Ok(None) => {}
                Err(e) if is_unique_violation(&e) => {}
                Err(e) => return Err(db_error("insert_conversation")(e)),
            }

            // Someone else won the race; read their row.
            let existing = client
                .query_opt(
                    r#"
                    SELECT conversation_id, report_id, user1_id, user2_id, created_at, updated_at
                    FROM conversations
                    WHERE report_id = $1 AND user1_id = $2 AND user2_id = $3
                    "#,
                    &[&key.report_id, &key.owner_id, &key.participant_id],
                )
                .await
                .map_err(db_error("find_conversation_by_key"))?;

            if let Some(row) = existing {
                return Ok((conversation_from_row(&row), false));
            }

            tracing::warn!(
                report_id = key.report_id,
                attempt,
                "conversation vanished between insert and read, retrying"
            );
        }

        Err(AppError::Conflict(
            "Conversation could not be created, please retry".to_string(),
        ))
    }

    async fn exists(&self, key: ConversationKey) -> AppResult<bool> {
        let client = self.pool.get().await.map_err(pool_error)?;
        let row = client
            .query_opt(
                r#"
                SELECT 1
                FROM conversations
                WHERE report_id = $1 AND user1_id = $2 AND user2_id = $3
                "#,
                &[&key.report_id, &key.owner_id, &key.participant_id],
            )
            .await
            .map_err(db_error("conversation_exists"))?;

        Ok(row.is_some())
    }

    async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<ConversationSummary>> {
        let client = self.pool.get().await.map_err(pool_error)?;
        let rows = client
            .query(
                r#"
                SELECT
                  c.conversation_id,
                  c.report_id,
                  COALESCE(r.title, '') AS report_title,
                  CASE WHEN c.user1_id = $1 THEN c.user2_id ELSE c.user1_id END AS other_user_id,
                  COALESCE(CASE WHEN c.user1_id = $1 THEN u2.name ELSE u1.name END, '') AS other_user_name,
                  lm.message_text AS last_message_text,
                  lm.created_at AS last_message_at,
                  (
                    SELECT COUNT(*)
                    FROM messages m
                    WHERE m.conversation_id = c.conversation_id
                      AND m.sender_id <> $1
                      AND NOT m.is_read
                  ) AS unread_count,
                  c.updated_at
                FROM conversations c
                LEFT JOIN reports r ON r.report_id = c.report_id
                LEFT JOIN users u1 ON u1.user_id = c.user1_id
                LEFT JOIN users u2 ON u2.user_id = c.user2_id
                LEFT JOIN LATERAL (
                  SELECT m.message_text, m.created_at
                  FROM messages m
                  WHERE m.conversation_id = c.conversation_id
                  ORDER BY m.created_at DESC, m.message_id DESC
                  LIMIT 1
                ) lm ON TRUE
                WHERE c.user1_id = $1 OR c.user2_id = $1
                ORDER BY lm.created_at IS NULL, lm.created_at DESC, c.updated_at DESC
                "#,
                &[&user_id],
            )
            .await
            .map_err(db_error("list_conversations"))?;

        Ok(rows.iter().map(summary_from_row).collect())
    }

    async fn touch(&self, conversation_id: i64) -> AppResult<()> {
        let client = self.pool.get().await.map_err(pool_error)?;
        client
            .execute(
                "UPDATE conversations SET updated_at = GREATEST(updated_at, NOW()) WHERE conversation_id = $1",
                &[&conversation_id],
            )
            .await
            .map_err(db_error("touch_conversation"))?;
        Ok(())
    }

    async fn delete(&self, conversation_id: i64) -> AppResult<()> {
        let mut client = self.pool.get().await.map_err(pool_error)?;
        let tx = client
            .transaction()
            .await
            .map_err(db_error("begin_delete_conversation"))?;

        // Messages first, then the conversation row
        let removed_messages = tx
            .execute(
                "DELETE FROM messages WHERE conversation_id = $1",
                &[&conversation_id],
            )
            .await
            .map_err(db_error("delete_messages"))?;
        tx.execute(
            "DELETE FROM conversations WHERE conversation_id = $1",
            &[&conversation_id],
        )
        .await
        .map_err(db_error("delete_conversation"))?;

        tx.commit()
            .await
            .map_err(db_error("commit_delete_conversation"))?;

        tracing::debug!(conversation_id, removed_messages, "conversation deleted");
        Ok(())
    }
}
