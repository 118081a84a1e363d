//! Adapter module
//!
//! Defines the Adapter trait, the registry mapping API types to adapters,
//! and the provider adapter implementations

pub mod ark;
pub mod openai;
pub mod upstream;

use crate::config::AppConfig;
use crate::models::{ImageRequest, ImageResponse, Usage};
use crate::relay::RelayContext;
use crate::utils::error::{ErrorCode, ErrorContext, RelayError, RelayResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub use ark::ArkAdapter;
pub use openai::OpenAiAdapter;
pub use upstream::{BoxStream, UpstreamResponse};

/// Upstream API family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApiType {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "ark")]
    Ark,
}

impl ApiType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiType::OpenAi => "openai",
            ApiType::Ark => "ark",
        }
    }
}

impl fmt::Display for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider-shaped request produced by an adapter
#[derive(Debug, Clone, PartialEq)]
pub enum ConvertedRequest {
    /// Structured payload, serialized as JSON by the pipeline
    Json(Value),
    /// Complete wire body, sent as-is
    Raw(Bytes),
}

/// Reconciled upstream response
#[derive(Debug)]
pub struct AdapterResponse {
    /// Usage reported by the upstream (zero fields mean "not reported")
    pub usage: Usage,
    /// Response forwarded to the client
    pub response: Response,
}

/// Adapter trait for upstream image APIs
///
/// The pipeline calls `init` once per request, before any other method.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Get the adapter name
    fn name(&self) -> &str;

    /// Prepare per-request state on the context
    fn init(&self, ctx: &mut RelayContext);

    /// Build the provider payload from the mapped request copy
    fn convert_image_request(&self, ctx: &RelayContext, request: &ImageRequest) -> Result<ConvertedRequest>;

    /// Send the final body upstream
    async fn do_request(&self, ctx: &RelayContext, body: Bytes) -> Result<UpstreamResponse>;

    /// Turn a successful upstream response into usage and a client response
    async fn do_response(&self, ctx: &RelayContext, response: UpstreamResponse) -> RelayResult<AdapterResponse>;
}

/// Adapter registry
///
/// Built once at startup; read-only afterwards.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<ApiType, Arc<dyn Adapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, api_type: ApiType, adapter: Arc<dyn Adapter>) {
        self.adapters.insert(api_type, adapter);
    }

    /// Create one adapter per API type used by the configured channels
    pub fn from_config(config: &AppConfig, timeout: Duration) -> Result<Self> {
        let mut registry = Self::new();

        for channel in config.channels.values() {
            if registry.adapters.contains_key(&channel.api_type) {
                continue;
            }
            let adapter: Arc<dyn Adapter> = match channel.api_type {
                ApiType::OpenAi => Arc::new(OpenAiAdapter::with_timeout(timeout)?),
                ApiType::Ark => Arc::new(ArkAdapter::with_timeout(timeout)?),
            };
            registry.register(channel.api_type, adapter);
        }

        info!("Adapter registry initialized with {} adapter types", registry.len());
        Ok(registry)
    }

    /// Look up the adapter for an API type
    pub fn get(&self, api_type: ApiType) -> RelayResult<Arc<dyn Adapter>> {
        self.adapters.get(&api_type).cloned().ok_or_else(|| {
            RelayError::new(ErrorCode::InvalidApiType, format!("Invalid api type: {}", api_type))
        })
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("api_types", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Largest upstream JSON image response that is buffered
pub const MAX_RESPONSE_BODY: usize = 128 * 1024 * 1024;

/// Create the HTTP client shared by an adapter's requests
///
/// Only connecting is bounded here. The relay bounds the wait for response
/// headers, and streamed bodies keep flowing after it returns.
fn build_client(connect_timeout: Duration) -> Result<Client> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .user_agent(concat!("imagerelay/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create HTTP client")
}

/// Apply bearer auth and channel headers to an upstream request
fn authorize(builder: reqwest::RequestBuilder, ctx: &RelayContext, key_env: &str) -> reqwest::RequestBuilder {
    let api_key = if ctx.channel.api_key.is_empty() {
        std::env::var(key_env).unwrap_or_default()
    } else {
        ctx.channel.api_key.clone()
    };

    ctx.channel
        .headers
        .iter()
        .fold(builder.bearer_auth(api_key), |builder, (name, value)| builder.header(name, value))
}

/// Forward an event-stream upstream body to the client unchanged
///
/// Usage is not known for streamed responses and is reported as zero.
fn forward_event_stream(response: UpstreamResponse) -> AdapterResponse {
    let content_type = response
        .content_type()
        .unwrap_or("text/event-stream")
        .to_string();
    let body = Body::from_stream(response.into_body_stream());

    AdapterResponse {
        usage: Usage::default(),
        response: (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, content_type),
                (header::CACHE_CONTROL, "no-cache".to_string()),
            ],
            body,
        )
            .into_response(),
    }
}

/// Read a JSON image response, extract its usage and forward the body as-is
async fn reconcile_json(response: UpstreamResponse) -> RelayResult<AdapterResponse> {
    let body = response
        .bytes_limited(MAX_RESPONSE_BODY)
        .await
        .relay_context(ErrorCode::DoResponseFailed, "Failed to read upstream response")?;

    let parsed: ImageResponse = serde_json::from_slice(&body)
        .relay_context(ErrorCode::DoResponseFailed, "Failed to parse upstream image response")?;

    debug!("Upstream returned {} images", parsed.data.len());

    Ok(AdapterResponse {
        usage: parsed.usage.unwrap_or_default(),
        response: (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
    })
}
