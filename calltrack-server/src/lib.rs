pub mod http;
pub mod middleware;
pub mod subsystems;
