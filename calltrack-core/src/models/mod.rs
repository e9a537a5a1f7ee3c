pub mod event;
pub mod session;
pub mod user;

pub use event::{check_event_time, event_time_floor, NewEvent, SessionEvent};
pub use session::{
    check_end_time, EndSession, Session, SessionDetails, SessionPage, SessionStatus, StartSession,
};
pub use user::{Credentials, Role, User};

use crate::error::CallTrackError;

/// Metadata columns hold open key-value documents; absent means empty.
pub(crate) fn normalize_metadata(
    value: Option<serde_json::Value>,
    field: &str,
) -> Result<serde_json::Value, CallTrackError> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(serde_json::json!({})),
        Some(v @ serde_json::Value::Object(_)) => Ok(v),
        Some(_) => Err(CallTrackError::Validation(format!(
            "{field} must be a JSON object"
        ))),
    }
}
