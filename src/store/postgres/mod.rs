//! tokio-postgres implementations of the store traits

mod conversations;
mod messages;
mod notifications;
mod reports;

pub use conversations::PgConversationStore;
pub use messages::PgMessageStore;
pub use notifications::PgNotificationStore;
pub use reports::PgReportDirectory;

use crate::error::AppError;

/// Log a failed query with its operation name and convert it.
pub(crate) fn db_error(operation: &'static str) -> impl Fn(tokio_postgres::Error) -> AppError {
    move |e| {
        tracing::error!(operation, error = %e, "database query failed");
        AppError::Database(e.to_string())
    }
}

pub(crate) fn pool_error(e: deadpool_postgres::PoolError) -> AppError {
    tracing::error!(error = %e, "failed to acquire database connection");
    AppError::Database(e.to_string())
}
