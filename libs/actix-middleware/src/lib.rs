//! # Actix Middleware Library
//!
//! Shared middleware for the lost-and-found Actix services
//!
//! ## Modules
//! - `token`: HS256 access-token verification and credential lookup
//! - `jwt_auth`: authentication middleware attaching an [`AuthContext`]
//! - `logging`: request/response logging
//! - `request_id`: `x-request-id` propagation

pub mod jwt_auth;
pub mod logging;
pub mod request_id;
pub mod token;

pub use jwt_auth::JwtAuthMiddleware;
pub use logging::Logging;
pub use request_id::RequestId;
pub use token::{extract_token, AuthContext, Claims, Role, TokenError, TokenVerifier};
