pub mod accounts;
pub mod events;
pub mod lifecycle;
pub mod listing;
