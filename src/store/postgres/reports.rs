use super::{db_error, pool_error};
use crate::error::AppResult;
use crate::models::ReportRef;
use crate::store::ReportDirectory;
use async_trait::async_trait;
use deadpool_postgres::Pool;

/// Reads the `reports` table owned by the report service.
pub struct PgReportDirectory {
    pool: Pool,
}

impl PgReportDirectory {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportDirectory for PgReportDirectory {
    async fn get_report(&self, report_id: i64) -> AppResult<Option<ReportRef>> {
        let client = self.pool.get().await.map_err(pool_error)?;
        let row = client
            .query_opt(
                r#"
                SELECT report_id::BIGINT AS report_id,
                       user_id,
                       COALESCE(title, '') AS title,
                       COALESCE(status::TEXT, '') AS status
                FROM reports
                WHERE report_id = $1::BIGINT
                "#,
                &[&report_id],
            )
            .await
            .map_err(db_error("get_report"))?;

        Ok(row.map(|row| ReportRef {
            report_id: row.get("report_id"),
            owner_id: row.get("user_id"),
            title: row.get("title"),
            status: row.get("status"),
        }))
    }
}
