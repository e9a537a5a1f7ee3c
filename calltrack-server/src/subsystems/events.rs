//! Event logger: appends immutable events to ongoing sessions.

use calltrack_core::error::CallTrackError;
use calltrack_core::models::{check_event_time, NewEvent, SessionEvent};
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::lifecycle;

/// Append one event.
///
/// Checks run in order: session exists, session is ongoing, `event_time` is
/// inside the trailing one-year window. The insert itself re-checks the
/// status under a `FOR SHARE` row lock, so an event can never land after a
/// termination has committed even if the two requests race.
pub async fn log_event(
    pool: &PgPool,
    session_id: Uuid,
    req: NewEvent,
) -> Result<SessionEvent, CallTrackError> {
    log_event_at(pool, session_id, req, Utc::now()).await
}

/// `log_event` with an explicit write time.
///
/// `now` is both the reference for the one-year window and the stored
/// `created_at`, which the `valid_event_time` constraint measures against.
/// It is truncated to the microsecond precision Postgres keeps, so the
/// application check and the constraint see the same instant.
pub async fn log_event_at(
    pool: &PgPool,
    session_id: Uuid,
    req: NewEvent,
    now: DateTime<Utc>,
) -> Result<SessionEvent, CallTrackError> {
    let metadata = req.validate()?;
    let now = now.trunc_subsecs(6);

    let session = lifecycle::fetch_session(pool, session_id)
        .await?
        .ok_or_else(CallTrackError::session_not_found)?;
    if session.status.is_terminal() {
        return Err(CallTrackError::SessionEnded);
    }

    check_event_time(req.event_time, now)?;

    let event = sqlx::query_as::<_, SessionEvent>(
        r#"
        INSERT INTO session_events (id, session_id, event_type, event_time, metadata, created_at)
        SELECT $1, s.id, $3, $4, $5, $6
        FROM sessions s
        WHERE s.id = $2 AND s.status = 'ongoing'
        FOR SHARE
        RETURNING id, session_id, event_type, event_time, metadata, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(session_id)
    .bind(&req.event_type)
    .bind(req.event_time)
    .bind(&metadata)
    .bind(now)
    .fetch_optional(pool)
    .await
    .map_err(CallTrackError::from_db)?;

    match event {
        Some(event) => {
            tracing::debug!(
                "Event {} ({}) logged for session {}",
                event.id,
                event.event_type,
                session_id
            );
            Ok(event)
        }
        None => {
            tracing::warn!("Event rejected: session {} ended concurrently", session_id);
            Err(CallTrackError::SessionEnded)
        }
    }
}
