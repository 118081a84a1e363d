//! Configuration management module
//!
//! Responsible for loading and managing application configuration, including environment variables and the channel file.

pub mod file;
pub mod settings;

pub use file::{AppConfig, ChannelConfig, ServerConfig, TokenConfig};
pub use settings::{LoggingConfig, RelaySettings, RequestConfig, Settings};
