//! Image Relay Library
//!
//! Relays OpenAI-compatible image generation and edit requests to upstream
//! providers, with model mapping, parameter override, status code remapping
//! and usage accounting

pub mod adapters;
pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod relay;
pub mod services;
pub mod utils;

// Re-export common types
pub use adapters::{Adapter, AdapterRegistry, ApiType};
pub use config::{AppConfig, Settings};
pub use handlers::{create_router, router_with_state, AppState};
pub use relay::{ImageRelay, RelayContext, RelayOutcome};
pub use utils::error::{ErrorCode, RelayError, RelayResult};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Library description
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get version information
pub fn version_info() -> String {
    format!("{} v{} - {}", NAME, VERSION, DESCRIPTION)
}
