//! Access-token verification shared by HTTP routes and the realtime gateway.
//!
//! Tokens are HS256 JWTs issued by the identity service. The claims carry the
//! caller's `user_id` and `role`; nothing else is read here.

use actix_web::{cookie::Cookie, http::header, HttpMessage};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

/// Cookie consulted when no `Authorization` header is present
pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    /// Unknown role strings degrade to `User`.
    pub fn from_claim(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// Authenticated caller identity attached to each request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthContext {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub user_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("missing credential")]
    Missing,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Verifies access tokens against the shared HS256 secret.
///
/// An optional static service token (used by automation accounts) maps
/// directly to a fixed identity without JWT decoding.
#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
    validation: Validation,
    static_token: Option<([u8; 32], AuthContext)>,
}

fn sha256(input: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hasher.finalize().into()
}

/// Digest comparison whose timing does not depend on where bytes differ.
fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(JWT_ALGORITHM),
            static_token: None,
        }
    }

    pub fn with_static_token(mut self, token: impl AsRef<str>, identity: AuthContext) -> Self {
        self.static_token = Some((sha256(token.as_ref().as_bytes()), identity));
        self
    }

    pub fn verify(&self, token: &str) -> Result<AuthContext, TokenError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TokenError::Missing);
        }

        if let Some((expected, identity)) = &self.static_token {
            if constant_time_eq(&sha256(token.as_bytes()), expected) {
                return Ok(*identity);
            }
        }

        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| TokenError::Invalid(e.to_string()))?;

        let role = data
            .claims
            .role
            .as_deref()
            .map(Role::from_claim)
            .unwrap_or(Role::User);

        Ok(AuthContext::new(data.claims.user_id, role))
    }

    /// Sign a token for `identity`. Used by tooling and tests; production
    /// tokens come from the identity service.
    pub fn issue(&self, identity: AuthContext, ttl: Duration) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            user_id: identity.user_id,
            role: Some(identity.role.as_str().to_string()),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(JWT_ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }
}

/// Pull a credential from `Authorization: Bearer ...`, falling back to the
/// `accessToken` cookie. Works for both `HttpRequest` and `ServiceRequest`.
pub fn extract_token<R: HttpMessage>(req: &R) -> Option<String> {
    let from_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    from_header.or_else(|| cookie_value(req, ACCESS_TOKEN_COOKIE))
}

fn cookie_value<R: HttpMessage>(req: &R, name: &str) -> Option<String> {
    req.headers()
        .get_all(header::COOKIE)
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| Cookie::parse(pair.trim()).ok())
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}
