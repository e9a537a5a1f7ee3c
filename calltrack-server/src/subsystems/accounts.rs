//! User registration, login and lookup.

use calltrack_core::config::AuthConfig;
use calltrack_core::error::CallTrackError;
use calltrack_core::identity::{self, TokenIssuer};
use calltrack_core::models::{Credentials, Role, User};
use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

const INVALID_CREDENTIALS: &str = "invalid credentials";

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

pub async fn register(
    pool: &PgPool,
    config: &AuthConfig,
    creds: Credentials,
) -> Result<User, CallTrackError> {
    identity::validate_registration(&creds.email, &creds.password)?;

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
        .bind(&creds.email)
        .fetch_one(pool)
        .await?;
    if exists {
        return Err(CallTrackError::Conflict("user already exists".to_string()));
    }

    let hash = identity::hash_password(creds.password, config.bcrypt_cost).await?;
    let now = Utc::now();

    // A concurrent registration can still slip past the EXISTS check; the
    // unique index turns that into the same conflict via `from_db`.
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, email, password, role, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $5)
        RETURNING id, email, password, role, created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&creds.email)
    .bind(&hash)
    .bind(Role::User)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(CallTrackError::from_db)?;

    tracing::info!("Registered user {} ({})", user.id, user.email);
    Ok(user)
}

/// Unknown email and wrong password are indistinguishable to the caller.
pub async fn login(
    pool: &PgPool,
    issuer: &TokenIssuer,
    creds: Credentials,
) -> Result<LoginResponse, CallTrackError> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, email, password, role, created_at, updated_at FROM users WHERE email = $1",
    )
    .bind(&creds.email)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| CallTrackError::Unauthorized(INVALID_CREDENTIALS.to_string()))?;

    if !identity::verify_password(creds.password, user.password.clone()).await? {
        tracing::warn!("Failed login for {}", user.email);
        return Err(CallTrackError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    }

    let token = issuer.issue(&user)?;
    Ok(LoginResponse { token, user })
}

pub async fn get_user(pool: &PgPool, id: Uuid) -> Result<Option<User>, CallTrackError> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, email, password, role, created_at, updated_at FROM users WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn list_users(pool: &PgPool) -> Result<Vec<User>, CallTrackError> {
    let users = sqlx::query_as::<_, User>(
        "SELECT id, email, password, role, created_at, updated_at FROM users ORDER BY created_at ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(users)
}
