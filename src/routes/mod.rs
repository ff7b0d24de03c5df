pub mod conversations;
pub mod health;
pub mod notifications;
pub mod wsroute;

use crate::error::{json_error_handler, path_error_handler, query_error_handler};
use crate::metrics;
use actix_middleware::{JwtAuthMiddleware, TokenVerifier};
use actix_web::web;
use std::sync::Arc;

/// Mount every route. Everything under `/user/{user_id}` requires a valid
/// access token; `/health`, `/metrics` and `/ws` authenticate on their own
/// or not at all.
pub fn configure(cfg: &mut web::ServiceConfig, verifier: Arc<TokenVerifier>) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .app_data(web::PathConfig::default().error_handler(path_error_handler))
        .app_data(web::QueryConfig::default().error_handler(query_error_handler))
        .service(health::health_check)
        .route("/metrics", web::get().to(metrics::serve_metrics))
        .service(wsroute::ws_handler)
        .service(
            web::scope("/user/{user_id}")
                .wrap(JwtAuthMiddleware::new(verifier))
                .configure(conversations::configure)
                .configure(notifications::configure),
        );
}
