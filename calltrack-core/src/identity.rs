//! Bearer credentials and password handling.
//!
//! Tokens are HS256 JWTs carrying the principal (id, email, role) plus the
//! registered `sub`/`iss`/`iat`/`nbf`/`exp` claims. Passwords are bcrypt
//! hashed on the blocking pool so request workers never stall on the hash.

use std::sync::OnceLock;

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::CallTrackError;
use crate::models::{Role, User};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    pub sub: String,
    pub iss: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

/// An authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

impl From<Claims> for Principal {
    fn from(c: Claims) -> Self {
        Self {
            user_id: c.user_id,
            email: c.email,
            role: c.role,
        }
    }
}

pub fn authorize(principal: &Principal, required: Role) -> Result<(), CallTrackError> {
    if principal.role.satisfies(required) {
        Ok(())
    } else {
        Err(CallTrackError::Forbidden(format!(
            "insufficient permissions: required role {required}"
        )))
    }
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(secret: &str, issuer: impl Into<String>, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            ttl,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, CallTrackError> {
        if config.jwt_secret.is_empty() {
            return Err(CallTrackError::config("auth.jwt_secret is not set"));
        }
        Ok(Self::new(
            &config.jwt_secret,
            config.issuer.clone(),
            Duration::hours(config.token_ttl_hours),
        ))
    }

    pub fn issue(&self, user: &User) -> Result<String, CallTrackError> {
        let now = Utc::now();
        let claims = Claims {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role,
            sub: user.id.to_string(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| CallTrackError::Other(format!("failed to sign token: {e}")))
    }

    /// Verify signature, algorithm, issuer, expiry and not-before.
    pub fn authenticate(&self, token: &str) -> Result<Principal, CallTrackError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_nbf = true;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "sub"]);

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            tracing::debug!("Token rejected: {}", e);
            CallTrackError::Unauthorized("invalid token".to_string())
        })?;
        Ok(data.claims.into())
    }
}

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles")
    })
}

pub fn validate_registration(email: &str, password: &str) -> Result<(), CallTrackError> {
    if !email_pattern().is_match(email) {
        return Err(CallTrackError::Validation("a valid email is required".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CallTrackError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub async fn hash_password(password: String, cost: u32) -> Result<String, CallTrackError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| CallTrackError::Other(format!("hash task failed: {e}")))?
        .map_err(|e| CallTrackError::Other(format!("failed to hash password: {e}")))
}

/// A malformed stored hash counts as a mismatch.
pub async fn verify_password(password: String, hash: String) -> Result<bool, CallTrackError> {
    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| CallTrackError::Other(format!("verify task failed: {e}")))?;
    Ok(verified.unwrap_or(false))
}
