//! File-based configuration loading
//!
//! Loads channel and token configuration from JSON file

use crate::adapters::ApiType;
use crate::relay::StatusCodeMapping;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen host (default: "127.0.0.1" - localhost only)
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port (default: 8082)
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8082
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Application configuration loaded from JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration (optional, defaults to localhost:8082)
    #[serde(default)]
    pub server: ServerConfig,

    /// Channel configurations, keyed by channel name
    pub channels: BTreeMap<String, ChannelConfig>,

    /// API tokens accepted by the relay
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

/// Upstream channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Adapter type serving this channel
    #[serde(rename = "type")]
    pub api_type: ApiType,

    /// Base URL for the upstream API
    #[serde(rename = "baseUrl")]
    pub base_url: String,

    /// API key (can be empty if using env var)
    #[serde(rename = "apiKey", default)]
    pub api_key: String,

    /// Client-facing model names served by this channel
    pub models: Vec<String>,

    /// Model name rewrites, followed as a chain
    #[serde(rename = "modelMapping", default)]
    pub model_mapping: HashMap<String, String>,

    /// Patch applied to the serialized upstream body
    #[serde(rename = "paramOverride", default, skip_serializing_if = "Map::is_empty")]
    pub param_override: Map<String, Value>,

    /// Upstream status remapping as a JSON object string, e.g. {"429":"503"}
    #[serde(rename = "statusCodeMapping", default, skip_serializing_if = "String::is_empty")]
    pub status_code_mapping: String,

    /// Forward client bodies verbatim on this channel
    #[serde(rename = "passThroughBody", default)]
    pub pass_through_body: bool,

    /// Custom headers to add to upstream requests
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

/// API token entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Secret presented as a bearer token
    pub key: String,
    /// Token identifier used in logs and billing
    pub id: String,
    /// Owning user
    #[serde(rename = "userId")]
    pub user_id: String,
}

impl AppConfig {
    /// Load configuration from JSON file
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading configuration from: {:?}", path);

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| "Failed to parse config JSON")?;

        config.validate()?;

        debug!("Loaded {} channels, {} tokens", config.channels.len(), config.tokens.len());
        Ok(config)
    }

    /// Load configuration from default locations
    /// Searches in order:
    /// 1. ~/.config/imagerelay/imagerelay.json
    /// 2. ./imagerelay.json
    ///
    /// Returns error if no configuration file is found.
    pub fn load_default() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config").join("imagerelay").join("imagerelay.json");
            if config_path.exists() {
                return Self::load(&config_path);
            }
        }

        let local_path = Path::new("imagerelay.json");
        if local_path.exists() {
            return Self::load(local_path);
        }

        anyhow::bail!(
            "Configuration file not found. Please create one at:\n\
             - ~/.config/imagerelay/imagerelay.json (recommended)\n\
             - ./imagerelay.json (current directory)"
        )
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            anyhow::bail!("At least one channel must be configured");
        }

        for (name, channel) in &self.channels {
            if !channel.base_url.starts_with("http") {
                anyhow::bail!("Invalid base URL for channel '{}': {}", name, channel.base_url);
            }

            if channel.models.is_empty() {
                anyhow::bail!("Channel '{}' must serve at least one model", name);
            }

            if !channel.status_code_mapping.is_empty() {
                StatusCodeMapping::parse(&channel.status_code_mapping)
                    .with_context(|| format!("Invalid statusCodeMapping for channel '{}'", name))?;
            }
        }

        let mut keys = HashSet::new();
        for token in &self.tokens {
            if token.key.is_empty() || token.id.is_empty() {
                anyhow::bail!("Tokens must have a non-empty key and id");
            }
            if !keys.insert(token.key.as_str()) {
                anyhow::bail!("Duplicate token key for token '{}'", token.id);
            }
        }

        Ok(())
    }

    /// Find the token entry for a bearer key
    pub fn find_token(&self, key: &str) -> Option<&TokenConfig> {
        self.tokens.iter().find(|token| token.key == key)
    }

    /// List all served model names
    pub fn list_models(&self) -> Vec<String> {
        let mut models: Vec<String> = self
            .channels
            .values()
            .flat_map(|channel| channel.models.iter().cloned())
            .collect();
        models.sort();
        models.dedup();
        models
    }
}
