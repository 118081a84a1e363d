//! Application configuration settings
//!
//! Process-wide settings loaded from environment variables

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Relay behaviour shared by every channel
    pub relay: RelaySettings,
    /// Request configuration
    pub request: RequestConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Global relay switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    /// Forward client bodies verbatim for every channel
    pub pass_through_request_enabled: bool,
    /// Emit final upstream bodies at debug level
    pub debug_enabled: bool,
    /// Upstream call timeout in seconds
    pub upstream_timeout: u64,
    /// Multipart form materialization timeout in seconds
    pub multipart_timeout: u64,
}

/// Request configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Maximum request size in bytes
    pub max_request_size: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (text/json)
    pub format: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            pass_through_request_enabled: false,
            debug_enabled: false,
            upstream_timeout: 300,
            multipart_timeout: 30,
        }
    }
}

impl RelaySettings {
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout)
    }

    pub fn multipart_timeout(&self) -> Duration {
        Duration::from_secs(self.multipart_timeout)
    }
}

impl Settings {
    /// Create a new configuration instance
    pub fn new() -> Result<Self> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        let settings = Self {
            relay: RelaySettings {
                pass_through_request_enabled: get_env_or_default("PASS_THROUGH_REQUEST_ENABLED", "false")
                    .parse()
                    .context("Invalid PASS_THROUGH_REQUEST_ENABLED flag")?,
                debug_enabled: get_env_or_default("DEBUG_ENABLED", "false")
                    .parse()
                    .context("Invalid DEBUG_ENABLED flag")?,
                upstream_timeout: get_env_or_default("UPSTREAM_TIMEOUT", "300")
                    .parse()
                    .context("Invalid upstream timeout")?,
                multipart_timeout: get_env_or_default("MULTIPART_TIMEOUT", "30")
                    .parse()
                    .context("Invalid multipart timeout")?,
            },
            request: RequestConfig {
                max_request_size: get_env_or_default("MAX_REQUEST_SIZE", "33554432")
                    .parse()
                    .context("Invalid maximum request size")?,
            },
            logging: LoggingConfig {
                level: get_env_or_default("RUST_LOG", "info"),
                format: get_env_or_default("LOG_FORMAT", "text"),
            },
        };

        // Validate configuration
        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration validity
    fn validate(&self) -> Result<()> {
        if self.relay.upstream_timeout == 0 || self.relay.multipart_timeout == 0 {
            anyhow::bail!("Timeout values cannot be 0");
        }

        if self.request.max_request_size == 0 {
            anyhow::bail!("Maximum request size cannot be 0");
        }

        // RUST_LOG may carry directives such as "imagerelay=debug"
        let level = self.logging.level.rsplit('=').next().unwrap_or_default();
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&level) {
            anyhow::bail!("Invalid log level: {}", self.logging.level);
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            anyhow::bail!("Invalid log format: {}", self.logging.format);
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            relay: RelaySettings::default(),
            request: RequestConfig {
                max_request_size: 32 * 1024 * 1024,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "text".to_string(),
            },
        }
    }
}

/// Get environment variable or default value
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
