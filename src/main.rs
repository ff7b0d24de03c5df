use actix_cors::Cors;
use actix_middleware::TokenVerifier;
use actix_web::{web, App, HttpServer};
use lostfound_chat_service::{
    config::Config, db, error::AppError, logging, metrics::MetricsMiddleware, routes,
    state::AppState,
};
use std::sync::Arc;

fn cors(frontend_url: Option<&str>) -> Cors {
    let cors = match frontend_url {
        Some(origin) => Cors::default().allowed_origin(origin).supports_credentials(),
        None => Cors::default().allow_any_origin(),
    };
    cors.allow_any_method().allow_any_header().max_age(3600)
}

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    logging::init_tracing();
    let cfg = Arc::new(Config::from_env()?);

    let pool = db::init_pool(&cfg.database_url, cfg.run_migrations)
        .await
        .map_err(|e| AppError::StartServer(format!("db: {e}")))?;

    let mut verifier = TokenVerifier::new(&cfg.access_token_secret);
    if let Some(bot) = &cfg.bot {
        verifier = verifier.with_static_token(bot.token.clone(), bot.identity);
    }
    let verifier = Arc::new(verifier);

    let state = AppState::with_postgres(pool, verifier.clone(), cfg.ws.clone());

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting lostfound-chat-service");

    let server_cfg = cfg.clone();
    HttpServer::new(move || {
        let verifier = verifier.clone();
        App::new()
            .wrap(cors(server_cfg.frontend_url.as_deref()))
            .wrap(MetricsMiddleware)
            .wrap(actix_middleware::Logging)
            .wrap(actix_middleware::RequestId::new())
            .app_data(web::Data::new(state.clone()))
            .configure(|c| routes::configure(c, verifier))
    })
    .bind(&bind_addr)
    .map_err(|e| AppError::StartServer(format!("bind: {e}")))?
    .run()
    .await
    .map_err(|e| AppError::StartServer(format!("server: {e}")))
}
