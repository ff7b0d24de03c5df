use db_pool::{create_pool, run_migrations, DbConfig, DbPoolError, Migration, PgPool};

pub const SERVICE_NAME: &str = "lostfound-chat-service";

/// Schema owned by this service, applied in version order.
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "0001_conversations_messages_notifications",
    sql: include_str!("../migrations/0001_conversations_messages_notifications.sql"),
}];

pub async fn init_pool(database_url: &str, migrate: bool) -> Result<PgPool, DbPoolError> {
    let mut cfg = DbConfig::from_env(SERVICE_NAME).unwrap_or_default();
    cfg.service_name = SERVICE_NAME.to_string();
    if cfg.database_url.is_empty() {
        cfg.database_url = database_url.to_string();
    }
    cfg.log_config();

    let pool = create_pool(cfg).await?;
    if migrate {
        let applied = run_migrations(&pool, MIGRATIONS).await?;
        tracing::info!(applied, "database migrations complete");
    }
    Ok(pool)
}
