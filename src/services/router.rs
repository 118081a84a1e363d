//! Channel Router
//!
//! Resolves a requested model to the channel serving it

use crate::adapters::ApiType;
use crate::config::AppConfig;
use crate::relay::ChannelSettings;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// A channel ready to serve requests
#[derive(Debug, Clone)]
pub struct RoutedChannel {
    pub api_type: ApiType,
    pub settings: Arc<ChannelSettings>,
}

/// Channel Router
///
/// Holds per-channel settings built once from the configuration
#[derive(Debug, Clone, Default)]
pub struct ChannelRouter {
    /// Channels in name order
    channels: Vec<(String, RoutedChannel)>,
    /// Model name to index into `channels`
    models: HashMap<String, usize>,
}

impl ChannelRouter {
    /// Create a new router from configuration
    ///
    /// When several channels list the same model, the first by name wins.
    pub fn new(config: &AppConfig) -> Self {
        let mut channels = Vec::with_capacity(config.channels.len());
        let mut models = HashMap::new();

        for (index, (name, channel)) in config.channels.iter().enumerate() {
            for model in &channel.models {
                models.entry(model.clone()).or_insert(index);
            }
            channels.push((
                name.clone(),
                RoutedChannel {
                    api_type: channel.api_type,
                    settings: Arc::new(ChannelSettings::from_config(name, channel)),
                },
            ));
        }

        info!("Channel router initialized with {} channels, {} models", channels.len(), models.len());
        Self { channels, models }
    }

    /// Route a model name to its channel
    pub fn route(&self, model: &str) -> Option<&RoutedChannel> {
        let index = *self.models.get(model)?;
        let (name, channel) = &self.channels[index];
        debug!("Routed {} to channel: {} ({})", model, name, channel.api_type);
        Some(channel)
    }

    /// Channel by name
    pub fn channel(&self, name: &str) -> Option<&RoutedChannel> {
        self.channels
            .iter()
            .find(|(channel_name, _)| channel_name == name)
            .map(|(_, channel)| channel)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
