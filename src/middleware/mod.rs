//! Middleware module
//!
//! Authentication and request logging layers

pub mod auth;
pub mod logging;

pub use auth::{auth_middleware, TokenIdentity};
pub use logging::request_logging_middleware;
