//! Request-level layers: access logging, bearer authentication, role gate.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use calltrack_core::error::CallTrackError;
use calltrack_core::identity::{authorize, Principal};
use calltrack_core::models::Role;

use crate::http::{error_response, HttpState};

pub async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    tracing::info!(
        "{} {} -> {} in {}ms",
        method,
        path,
        response.status().as_u16(),
        start.elapsed().as_millis()
    );
    response
}

/// Extract the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, CallTrackError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| CallTrackError::Unauthorized("authorization header is required".to_string()))?;
    let value = value
        .to_str()
        .map_err(|_| CallTrackError::Unauthorized("invalid authorization header format".to_string()))?;

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(CallTrackError::Unauthorized(
            "invalid authorization header format".to_string(),
        )),
    }
}

fn reject(err: CallTrackError) -> Response {
    let (status, body) = error_response(&err);
    (status, Json(body)).into_response()
}

/// Verify the bearer token and attach the [`Principal`] to the request.
pub async fn authenticate(
    State(state): State<Arc<HttpState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let principal = match bearer_token(req.headers()).and_then(|t| state.issuer.authenticate(t)) {
        Ok(p) => p,
        Err(e) => return reject(e),
    };
    req.extensions_mut().insert(principal);
    next.run(req).await
}

pub async fn require_admin(req: Request, next: Next) -> Response {
    let checked = match req.extensions().get::<Principal>() {
        Some(principal) => authorize(principal, Role::Admin),
        None => Err(CallTrackError::Unauthorized("user not found in context".to_string())),
    };
    match checked {
        Ok(()) => next.run(req).await,
        Err(e) => reject(e),
    }
}
