//! Embedded SQL migrations
//!
//! Services embed their schema files with `include_str!` and hand them to
//! [`run_migrations`] at startup. Applied versions are tracked in
//! `_schema_migrations`; each migration runs in its own transaction and a
//! session advisory lock keeps concurrent instances from racing.

use crate::{DbPoolError, PgPool};
use std::collections::HashSet;
use tracing::info;

const MIGRATION_LOCK_ID: i64 = 0x6c6f_7374_666f_756e;

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

/// Migrations not yet recorded as applied, in ascending version order
pub fn pending<'a>(migrations: &'a [Migration], applied: &[i64]) -> Vec<&'a Migration> {
    let applied: HashSet<i64> = applied.iter().copied().collect();
    let mut pending: Vec<&Migration> = migrations
        .iter()
        .filter(|m| !applied.contains(&m.version))
        .collect();
    pending.sort_by_key(|m| m.version);
    pending
}

fn check_unique_versions(migrations: &[Migration]) -> Result<(), DbPoolError> {
    let mut seen = HashSet::new();
    for m in migrations {
        if !seen.insert(m.version) {
            return Err(DbPoolError::Migration {
                version: m.version,
                name: m.name.to_string(),
                reason: "duplicate migration version".into(),
            });
        }
    }
    Ok(())
}

/// Apply pending migrations; returns how many were applied
pub async fn run_migrations(pool: &PgPool, migrations: &[Migration]) -> Result<usize, DbPoolError> {
    check_unique_versions(migrations)?;

    let mut client = pool.get().await?;
    client
        .batch_execute(
            r#"
            CREATE TABLE IF NOT EXISTS _schema_migrations (
                version BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .await?;

    client
        .execute("SELECT pg_advisory_lock($1)", &[&MIGRATION_LOCK_ID])
        .await?;

    let result = apply_pending(&mut client, migrations).await;

    client
        .execute("SELECT pg_advisory_unlock($1)", &[&MIGRATION_LOCK_ID])
        .await?;

    result
}

async fn apply_pending(
    client: &mut deadpool_postgres::Client,
    migrations: &[Migration],
) -> Result<usize, DbPoolError> {
    let applied: Vec<i64> = client
        .query("SELECT version FROM _schema_migrations", &[])
        .await?
        .iter()
        .map(|row| row.get(0))
        .collect();

    let todo = pending(migrations, &applied);
    for m in &todo {
        let tx = client.transaction().await?;
        tx.batch_execute(m.sql)
            .await
            .map_err(|e| DbPoolError::Migration {
                version: m.version,
                name: m.name.to_string(),
                reason: e.to_string(),
            })?;
        tx.execute(
            "INSERT INTO _schema_migrations (version, name) VALUES ($1, $2)",
            &[&m.version, &m.name],
        )
        .await?;
        tx.commit().await?;

        info!(version = m.version, name = m.name, "applied migration");
    }

    Ok(todo.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIGRATIONS: &[Migration] = &[
        Migration {
            version: 2,
            name: "second",
            sql: "SELECT 2",
        },
        Migration {
            version: 1,
            name: "first",
            sql: "SELECT 1",
        },
        Migration {
            version: 3,
            name: "third",
            sql: "SELECT 3",
        },
    ];

    #[test]
    fn test_pending_sorted_and_filtered() {
        let todo = pending(MIGRATIONS, &[2]);
        let versions: Vec<i64> = todo.iter().map(|m| m.version).collect();
        assert_eq!(versions, vec![1, 3]);
    }

    #[test]
    fn test_nothing_pending_when_all_applied() {
        assert!(pending(MIGRATIONS, &[1, 2, 3]).is_empty());
    }

    #[test]
    fn test_duplicate_versions_rejected() {
        let dup = [MIGRATIONS[0], MIGRATIONS[0]];
        assert!(matches!(
            check_unique_versions(&dup),
            Err(DbPoolError::Migration { version: 2, .. })
        ));
        assert!(check_unique_versions(MIGRATIONS).is_ok());
    }
}
