use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CallTrackError, END_TIME_MESSAGE};

/// Lifecycle state of a call session. `Ongoing` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "session_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Ongoing,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Ongoing)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = CallTrackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ongoing" => Ok(Self::Ongoing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(CallTrackError::Validation("invalid status value".to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub caller_id: String,
    pub callee_id: String,
    pub status: SessionStatus,
    pub initial_metadata: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disposition: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartSession {
    pub caller_id: String,
    pub callee_id: String,
    #[serde(default)]
    pub initial_metadata: Option<serde_json::Value>,
}

impl StartSession {
    /// Returns the metadata document to persist.
    pub fn validate(&self) -> Result<serde_json::Value, CallTrackError> {
        if self.caller_id.trim().is_empty() {
            return Err(CallTrackError::Validation("caller_id is required".to_string()));
        }
        if self.callee_id.trim().is_empty() {
            return Err(CallTrackError::Validation("callee_id is required".to_string()));
        }
        super::normalize_metadata(self.initial_metadata.clone(), "initial_metadata")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndSession {
    pub status: SessionStatus,
    pub disposition: String,
    pub end_time: DateTime<Utc>,
}

impl EndSession {
    pub fn validate(&self) -> Result<(), CallTrackError> {
        if !self.status.is_terminal() {
            return Err(CallTrackError::Validation(
                "status must be one of: completed, failed".to_string(),
            ));
        }
        if self.disposition.trim().is_empty() {
            return Err(CallTrackError::Validation("disposition is required".to_string()));
        }
        Ok(())
    }
}

/// A session cannot end before it started.
pub fn check_end_time(
    started_at: DateTime<Utc>,
    end_time: DateTime<Utc>,
) -> Result<(), CallTrackError> {
    if end_time < started_at {
        return Err(CallTrackError::Validation(END_TIME_MESSAGE.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionDetails {
    pub session: Session,
    pub events: Vec<super::SessionEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionPage {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub sessions: Vec<Session>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_status_parse_roundtrip() {
        for status in [SessionStatus::Ongoing, SessionStatus::Completed, SessionStatus::Failed] {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
        assert!("ended".parse::<SessionStatus>().is_err());
        assert!("Completed".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn test_only_ongoing_is_non_terminal() {
        assert!(!SessionStatus::Ongoing.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_end_time_before_start_rejected() {
        let start = Utc::now();
        let err = check_end_time(start, start - Duration::seconds(1)).unwrap_err();
        assert_eq!(err.to_string(), END_TIME_MESSAGE);
        assert!(check_end_time(start, start).is_ok());
        assert!(check_end_time(start, start + Duration::seconds(1)).is_ok());
    }

    #[test]
    fn test_end_request_rejects_ongoing() {
        let req = EndSession {
            status: SessionStatus::Ongoing,
            disposition: "ok".to_string(),
            end_time: Utc::now(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_end_request_requires_disposition() {
        let req = EndSession {
            status: SessionStatus::Failed,
            disposition: "  ".to_string(),
            end_time: Utc::now(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_start_request_defaults_metadata() {
        let req: StartSession =
            serde_json::from_value(serde_json::json!({"caller_id": "A", "callee_id": "B"})).unwrap();
        assert_eq!(req.validate().unwrap(), serde_json::json!({}));
    }

    #[test]
    fn test_start_request_rejects_blank_caller() {
        let req = StartSession {
            caller_id: " ".to_string(),
            callee_id: "B".to_string(),
            initial_metadata: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_ongoing_session_omits_end_fields() {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            started_at: now,
            ended_at: None,
            caller_id: "A".to_string(),
            callee_id: "B".to_string(),
            status: SessionStatus::Ongoing,
            initial_metadata: serde_json::json!({"codec": {"name": "opus", "rates": [8000, 48000]}}),
            disposition: None,
            created_at: now,
            updated_at: now,
        };
        let v = serde_json::to_value(&session).unwrap();
        assert_eq!(v["status"], "ongoing");
        assert!(v.get("ended_at").is_none());
        assert!(v.get("disposition").is_none());
        assert_eq!(v["initial_metadata"]["codec"]["rates"][1], 48000);
    }
}
