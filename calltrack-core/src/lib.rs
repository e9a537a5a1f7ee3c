pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod models;

pub use config::CallTrackConfig;
pub use error::{CallTrackError, ErrorKind};
pub use identity::{authorize, Principal, TokenIssuer};
pub use models::{Role, Session, SessionEvent, SessionStatus, User};
