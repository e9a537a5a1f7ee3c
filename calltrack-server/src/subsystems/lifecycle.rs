//! Session lifecycle: start, end, details.
//!
//! State machine: `ongoing → completed | failed`, terminal states are final.
//!
//! Termination is exactly-once across any number of server processes. The
//! transition is a single conditional `UPDATE … WHERE status = 'ongoing'`;
//! whichever statement PostgreSQL applies first wins and every other
//! concurrent attempt sees zero affected rows (`RaceLost`). There is no
//! in-process lock and nothing is retried.

use calltrack_core::error::CallTrackError;
use calltrack_core::models::{
    check_end_time, EndSession, Session, SessionDetails, SessionEvent, StartSession,
};
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

pub async fn start_session(pool: &PgPool, req: StartSession) -> Result<Session, CallTrackError> {
    let metadata = req.validate()?;
    let now = Utc::now();

    let session = sqlx::query_as::<_, Session>(
        r#"
        INSERT INTO sessions (id, started_at, caller_id, callee_id, status, initial_metadata, created_at, updated_at)
        VALUES ($1, $2, $3, $4, 'ongoing', $5, $2, $2)
        RETURNING id, started_at, ended_at, caller_id, callee_id, status, initial_metadata, disposition, created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(now)
    .bind(&req.caller_id)
    .bind(&req.callee_id)
    .bind(&metadata)
    .fetch_one(pool)
    .await
    .map_err(CallTrackError::from_db)?;

    tracing::info!(
        "Session {} started: {} -> {}",
        session.id,
        session.caller_id,
        session.callee_id
    );
    Ok(session)
}

pub async fn fetch_session(pool: &PgPool, id: Uuid) -> Result<Option<Session>, CallTrackError> {
    sqlx::query_as::<_, Session>(
        r#"
        SELECT id, started_at, ended_at, caller_id, callee_id, status, initial_metadata, disposition, created_at, updated_at
        FROM sessions WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(CallTrackError::from_db)
}

pub async fn end_session(
    pool: &PgPool,
    id: Uuid,
    req: EndSession,
) -> Result<Session, CallTrackError> {
    req.validate()?;

    let current = fetch_session(pool, id)
        .await?
        .ok_or_else(CallTrackError::session_not_found)?;

    if current.status.is_terminal() {
        return Err(CallTrackError::AlreadyEnded(current.status));
    }
    check_end_time(current.started_at, req.end_time)?;

    // Compare-and-swap on status; the check constraints back up the ordering rule.
    let ended = sqlx::query_as::<_, Session>(
        r#"
        UPDATE sessions
        SET status = $1, disposition = $2, ended_at = $3, updated_at = CURRENT_TIMESTAMP
        WHERE id = $4 AND status = 'ongoing'
        RETURNING id, started_at, ended_at, caller_id, callee_id, status, initial_metadata, disposition, created_at, updated_at
        "#,
    )
    .bind(req.status)
    .bind(&req.disposition)
    .bind(req.end_time)
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(CallTrackError::from_db)?;

    match ended {
        Some(session) => {
            tracing::info!("Session {} ended with status {}", id, session.status);
            Ok(session)
        }
        None => {
            tracing::warn!("Session {} was terminated by a concurrent request", id);
            Err(CallTrackError::RaceLost)
        }
    }
}

/// Session plus its events in replay order (`event_time`, not arrival).
pub async fn get_session_details(
    pool: &PgPool,
    id: Uuid,
) -> Result<SessionDetails, CallTrackError> {
    let session = fetch_session(pool, id)
        .await?
        .ok_or_else(CallTrackError::session_not_found)?;

    let events = sqlx::query_as::<_, SessionEvent>(
        r#"
        SELECT id, session_id, event_type, event_time, metadata, created_at
        FROM session_events
        WHERE session_id = $1
        ORDER BY event_time ASC, created_at ASC
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await
    .map_err(CallTrackError::from_db)?;

    Ok(SessionDetails { session, events })
}
