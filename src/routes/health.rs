use crate::state::AppState;
use actix_web::{get, web, HttpResponse};
use chrono::Utc;
use serde_json::json;

/// Liveness plus a `SELECT 1` against the pool.
#[get("/health")]
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let timestamp = Utc::now();
    let uptime_secs = state.started_at.elapsed().as_secs();

    let Some(pool) = state.db.as_ref() else {
        return HttpResponse::Ok().json(json!({
            "status": "ok",
            "database": "in-memory",
            "timestamp": timestamp,
            "uptime_secs": uptime_secs,
        }));
    };

    match db_pool::ping(pool).await {
        Ok(()) => HttpResponse::Ok().json(json!({
            "status": "ok",
            "database": "connected",
            "timestamp": timestamp,
            "uptime_secs": uptime_secs,
        })),
        Err(e) => {
            tracing::error!(error = %e, "health check database ping failed");
            HttpResponse::ServiceUnavailable().json(json!({
                "status": "error",
                "database": "disconnected",
                "timestamp": timestamp,
                "error": e.to_string(),
            }))
        }
    }
}
