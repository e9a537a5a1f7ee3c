use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CallTrackError, EVENT_TIME_MESSAGE};

/// Events older than this (relative to the server clock at write time) are refused.
pub const MAX_EVENT_AGE: Months = Months::new(12);

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SessionEvent {
    pub id: Uuid,
    pub session_id: Uuid,
    pub event_type: String,
    pub event_time: DateTime<Utc>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub event_type: String,
    pub event_time: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl NewEvent {
    pub fn validate(&self) -> Result<serde_json::Value, CallTrackError> {
        if self.event_type.trim().is_empty() {
            return Err(CallTrackError::Validation("event_type is required".to_string()));
        }
        super::normalize_metadata(self.metadata.clone(), "metadata")
    }
}

/// Oldest admissible `event_time` for an insert happening at `now`.
pub fn event_time_floor(now: DateTime<Utc>) -> DateTime<Utc> {
    now.checked_sub_months(MAX_EVENT_AGE)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// The floor itself is admissible.
pub fn check_event_time(
    event_time: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), CallTrackError> {
    if event_time < event_time_floor(now) {
        return Err(CallTrackError::Validation(EVENT_TIME_MESSAGE.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_boundary_is_inclusive() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
        let floor = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        assert_eq!(event_time_floor(now), floor);
        assert!(check_event_time(floor, now).is_ok());
    }

    #[test]
    fn test_older_than_a_year_rejected() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
        let too_old = event_time_floor(now) - Duration::milliseconds(1);
        let err = check_event_time(too_old, now).unwrap_err();
        assert_eq!(err.to_string(), EVENT_TIME_MESSAGE);
    }

    #[test]
    fn test_future_and_recent_accepted() {
        let now = Utc::now();
        assert!(check_event_time(now, now).is_ok());
        assert!(check_event_time(now - Duration::days(30), now).is_ok());
        assert!(check_event_time(now + Duration::hours(1), now).is_ok());
    }

    #[test]
    fn test_leap_day_floor_clamps() {
        let now = Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap();
        assert_eq!(
            event_time_floor(now),
            Utc.with_ymd_and_hms(2023, 2, 28, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_new_event_requires_type() {
        let req = NewEvent {
            event_type: "".to_string(),
            event_time: Utc::now(),
            metadata: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_new_event_rejects_scalar_metadata() {
        let req = NewEvent {
            event_type: "ring".to_string(),
            event_time: Utc::now(),
            metadata: Some(serde_json::json!("loud")),
        };
        assert!(req.validate().is_err());
    }
}
