use crate::error::AppError;
use actix_middleware::{AuthContext, Role};
use dotenvy::dotenv;
use std::env;
use uuid::Uuid;

/// Static credential for automation accounts
#[derive(Debug, Clone)]
pub struct BotCredential {
    pub token: String,
    pub identity: AuthContext,
}

#[derive(Debug, Clone)]
pub struct WsConfig {
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 5,
            client_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub access_token_secret: String,
    pub frontend_url: Option<String>,
    pub bot: Option<BotCredential>,
    pub ws: WsConfig,
    pub run_migrations: bool,
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_flag(key: &str, default: bool) -> bool {
    match non_empty(key).as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("1") | Some("true") | Some("yes") => true,
        Some("0") | Some("false") | Some("no") => false,
        _ => default,
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let database_url = non_empty("DATABASE_URL")
            .ok_or_else(|| AppError::Config("DATABASE_URL missing".into()))?;
        let access_token_secret = non_empty("ACCESS_TOKEN_SECRET")
            .ok_or_else(|| AppError::Config("ACCESS_TOKEN_SECRET missing".into()))?;

        let bot = Self::bot_from_env()?;
        if bot.is_some() {
            tracing::info!("static bot credential enabled");
        }

        let ws_defaults = WsConfig::default();
        Ok(Self {
            database_url,
            port: parse_or("PORT", 3000),
            access_token_secret,
            frontend_url: non_empty("FRONTEND_URL"),
            bot,
            ws: WsConfig {
                heartbeat_interval_secs: parse_or(
                    "WS_HEARTBEAT_INTERVAL_SECS",
                    ws_defaults.heartbeat_interval_secs,
                ),
                client_timeout_secs: parse_or("WS_CLIENT_TIMEOUT_SECS", ws_defaults.client_timeout_secs),
            },
            run_migrations: parse_flag("RUN_MIGRATIONS", true),
        })
    }

    fn bot_from_env() -> Result<Option<BotCredential>, AppError> {
        let (token, user_id) = match (non_empty("BOT_ACCESS_TOKEN"), non_empty("BOT_USER_ID")) {
            (Some(token), Some(user_id)) => (token, user_id),
            _ => return Ok(None),
        };

        let user_id = Uuid::parse_str(&user_id)
            .map_err(|e| AppError::Config(format!("BOT_USER_ID is not a UUID: {e}")))?;
        let role = non_empty("BOT_ROLE")
            .map(|r| Role::from_claim(&r))
            .unwrap_or(Role::User);

        Ok(Some(BotCredential {
            token,
            identity: AuthContext::new(user_id, role),
        }))
    }
}
