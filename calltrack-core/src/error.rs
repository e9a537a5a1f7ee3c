use thiserror::Error;

use crate::models::SessionStatus;

pub const EVENT_TIME_MESSAGE: &str = "event_time must be within the last year";
pub const END_TIME_MESSAGE: &str = "end_time must be after or equal to started_at";

#[derive(Error, Debug)]
pub enum CallTrackError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("session is already ended with status: {0}")]
    AlreadyEnded(SessionStatus),

    #[error("session could not be ended - it may have been ended by another request")]
    RaceLost,

    #[error("cannot log events for ended session")]
    SessionEnded,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Other error: {0}")]
    Other(String),
}

/// The externally visible failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ValidationFailed,
    NotFound,
    Conflict,
    Unauthorized,
    Forbidden,
    Internal,
}

impl CallTrackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationFailed,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyEnded(_) | Self::RaceLost | Self::SessionEnded | Self::Conflict(_) => {
                ErrorKind::Conflict
            }
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Database(_) | Self::Config(_) | Self::Other(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(config::ConfigError::Message(msg.into()))
    }

    pub fn session_not_found() -> Self {
        Self::NotFound("session not found".to_string())
    }

    /// Re-surface storage constraint violations as actionable errors.
    ///
    /// The check constraints on `sessions` and `session_events` are the last
    /// line of defense behind the application checks; when one fires it must
    /// reach the caller as a validation failure, not an internal error.
    pub fn from_db(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.constraint() {
                Some("valid_event_time") => {
                    return Self::Validation(EVENT_TIME_MESSAGE.to_string())
                }
                Some("valid_session_times") => {
                    return Self::Validation(END_TIME_MESSAGE.to_string())
                }
                Some("valid_session_end") => {
                    return Self::Validation("ended_at must be set exactly when a session is terminal".to_string())
                }
                _ => {}
            }
            if db_err.is_unique_violation() && db_err.constraint() == Some("users_email_key") {
                return Self::Conflict("user already exists".to_string());
            }
        }
        Self::Database(err)
    }
}
