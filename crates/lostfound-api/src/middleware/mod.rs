//! HTTP middleware

pub mod auth;
pub mod logging;

pub use auth::Caller;
pub use logging::logging_middleware;
