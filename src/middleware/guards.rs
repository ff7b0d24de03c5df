//! Typed request context for authenticated handlers

use crate::error::AppError;
use actix_middleware::{AuthContext, Role};
use actix_web::{Error, FromRequest, HttpMessage, HttpRequest};
use std::future::{ready, Ready};
use uuid::Uuid;

/// Caller identity attached by `JwtAuthMiddleware`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

impl AuthUser {
    /// Callers may only act on their own `/user/{user_id}` resources,
    /// admins on anyone's.
    pub fn ensure_path_user(&self, path_user_id: Uuid) -> Result<(), AppError> {
        if self.id == path_user_id || self.role.is_admin() {
            return Ok(());
        }
        tracing::debug!(caller = %self.id, path_user_id = %path_user_id, "path user mismatch");
        Err(AppError::Forbidden("Forbidden".to_string()))
    }
}

impl From<AuthContext> for AuthUser {
    fn from(ctx: AuthContext) -> Self {
        Self {
            id: ctx.user_id,
            role: ctx.role,
        }
    }
}

impl FromRequest for AuthUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let ctx = req.extensions().get::<AuthContext>().cloned();
        ready(
            ctx.map(AuthUser::from)
                .ok_or_else(|| AppError::Unauthorized.into()),
        )
    }
}
