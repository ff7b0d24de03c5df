//! Database connection pool management
//!
//! Provides pool creation, pool metrics and a small embedded-migration runner
//! on top of deadpool-postgres.

mod metrics;
pub mod migrate;

use metrics::update_pool_metrics;
pub use metrics::acquire_with_metrics;
pub use migrate::{run_migrations, Migration};

use deadpool_postgres::tokio_postgres::{Config as PgConfig, NoTls};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime, TimeoutType};
pub use deadpool_postgres::PoolError;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

pub type PgPool = Pool;

#[derive(Debug, Error)]
pub enum DbPoolError {
    #[error("invalid database configuration: {0}")]
    Config(String),

    #[error("failed to build pool: {0}")]
    Build(String),

    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("database error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("database connection verification timed out after {0}s")]
    VerifyTimeout(u64),

    #[error("migration {version} ({name}) failed: {reason}")]
    Migration {
        version: i64,
        name: String,
        reason: String,
    },
}

/// Database connection pool configuration
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Service name for metrics labeling
    pub service_name: String,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Maximum number of connections
    pub max_connections: u32,
    /// Minimum number of connections
    pub min_connections: u32,
    /// Connection creation timeout (new connection to PostgreSQL)
    pub connect_timeout_secs: u64,
    /// Connection acquisition timeout (get connection from pool)
    pub acquire_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            service_name: String::from("unknown"),
            database_url: String::new(),
            max_connections: 20,
            min_connections: 5,
            connect_timeout_secs: 5,
            acquire_timeout_secs: 10,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl DbConfig {
    /// Create a new DbConfig from environment variables
    pub fn from_env(service_name: &str) -> Result<Self, DbPoolError> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| DbPoolError::Config("DATABASE_URL environment variable not set".into()))?;

        let defaults = Self::default();
        Ok(Self {
            service_name: service_name.to_string(),
            database_url,
            max_connections: env_or("DB_MAX_CONNECTIONS", defaults.max_connections),
            min_connections: env_or("DB_MIN_CONNECTIONS", defaults.min_connections),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT_SECS", defaults.connect_timeout_secs),
            acquire_timeout_secs: env_or("DB_ACQUIRE_TIMEOUT_SECS", defaults.acquire_timeout_secs),
        })
    }

    /// Log pool configuration details
    pub fn log_config(&self) {
        info!(
            service = %self.service_name,
            max_connections = self.max_connections,
            min_connections = self.min_connections,
            connect_timeout_secs = self.connect_timeout_secs,
            acquire_timeout_secs = self.acquire_timeout_secs,
            "Database pool configuration"
        );
    }
}

/// Build a deadpool-postgres pool and verify it with `SELECT 1`
pub async fn create_pool(config: DbConfig) -> Result<PgPool, DbPoolError> {
    debug!(
        service = %config.service_name,
        max = config.max_connections,
        acquire_timeout_secs = config.acquire_timeout_secs,
        "Creating database pool"
    );

    let mut pg_config: PgConfig = config
        .database_url
        .parse()
        .map_err(|e: tokio_postgres::Error| DbPoolError::Config(e.to_string()))?;
    pg_config.connect_timeout(Duration::from_secs(config.connect_timeout_secs));

    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };
    let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
    let pool = Pool::builder(mgr)
        .max_size(config.max_connections as usize)
        .wait_timeout(Some(Duration::from_secs(config.acquire_timeout_secs)))
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| DbPoolError::Build(e.to_string()))?;

    let verify = async {
        let client = pool.get().await?;
        client.simple_query("SELECT 1").await?;
        Ok::<(), DbPoolError>(())
    };

    match tokio::time::timeout(Duration::from_secs(config.connect_timeout_secs), verify).await {
        Ok(Ok(())) => {
            info!(
                service = %config.service_name,
                "Database pool created and verified successfully"
            );

            update_pool_metrics(&pool, &config.service_name);

            let pool_clone = pool.clone();
            let service = config.service_name.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(30));
                loop {
                    interval.tick().await;
                    update_pool_metrics(&pool_clone, &service);
                }
            });

            Ok(pool)
        }
        Ok(Err(e)) => {
            error!(
                service = %config.service_name,
                error = %e,
                "Database connection verification failed"
            );
            Err(e)
        }
        Err(_) => {
            error!(
                service = %config.service_name,
                timeout_secs = config.connect_timeout_secs,
                "Database connection verification timeout"
            );
            Err(verification_timeout())
        }
    }
}

fn verification_timeout() -> DbPoolError {
    DbPoolError::Pool(PoolError::Timeout(TimeoutType::Wait))
}

/// Cheap liveness probe used by health endpoints
pub async fn ping(pool: &PgPool) -> Result<(), DbPoolError> {
    let client = pool.get().await?;
    client.simple_query("SELECT 1").await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_timeout_is_pool_wait_timeout() {
        assert!(matches!(
            verification_timeout(),
            DbPoolError::Pool(PoolError::Timeout(TimeoutType::Wait))
        ));
    }

    #[test]
    fn test_default_config() {
        let config = DbConfig::default();
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.min_connections, 5);
        assert_eq!(config.connect_timeout_secs, 5);
        assert_eq!(config.acquire_timeout_secs, 10);
    }

    #[test]
    #[serial_test::serial]
    fn test_config_from_env_without_override() {
        std::env::remove_var("DB_MAX_CONNECTIONS");
        std::env::remove_var("DB_MIN_CONNECTIONS");
        std::env::remove_var("DB_CONNECT_TIMEOUT_SECS");
        std::env::remove_var("DB_ACQUIRE_TIMEOUT_SECS");

        std::env::set_var("DATABASE_URL", "postgres://localhost/test");
        let config = DbConfig::from_env("test-service").unwrap();

        assert_eq!(config.service_name, "test-service");
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.min_connections, 5);

        std::env::remove_var("DATABASE_URL");
    }

    #[test]
    #[serial_test::serial]
    fn test_config_env_override_and_invalid_values() {
        std::env::set_var("DATABASE_URL", "postgres://localhost/test");
        std::env::set_var("DB_MAX_CONNECTIONS", "8");
        std::env::set_var("DB_ACQUIRE_TIMEOUT_SECS", "not-a-number");

        let config = DbConfig::from_env("test-service").unwrap();
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.acquire_timeout_secs, 10);

        std::env::remove_var("DB_MAX_CONNECTIONS");
        std::env::remove_var("DB_ACQUIRE_TIMEOUT_SECS");
        std::env::remove_var("DATABASE_URL");
    }

    #[test]
    #[serial_test::serial]
    fn test_config_requires_database_url() {
        std::env::remove_var("DATABASE_URL");
        assert!(matches!(
            DbConfig::from_env("test-service"),
            Err(DbPoolError::Config(_))
        ));
    }

    #[test]
    fn test_create_pool_rejects_malformed_url() {
        let config = DbConfig {
            database_url: "not a url at all".into(),
            ..DbConfig::default()
        };
        let result = tokio_test::block_on(create_pool(config));
        assert!(matches!(result, Err(DbPoolError::Config(_))));
    }
}
