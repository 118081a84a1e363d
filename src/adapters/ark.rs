//! Ark adapter
//!
//! Volcengine Ark image generation API with Bearer token authentication.
//! Only generations are supported; Ark has no edit endpoint.

use super::{authorize, build_client, forward_event_stream, reconcile_json};
use super::{Adapter, AdapterResponse, ConvertedRequest, UpstreamResponse};
use crate::models::ImageRequest;
use crate::relay::{RelayContext, RelayMode};
use crate::utils::error::RelayResult;
use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::body::Bytes;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, error};

/// Ark image generation request
///
/// Ark specific options (`seed`, `guidance_scale`, `watermark`, ...) travel
/// in `extra`.
#[derive(Debug, Serialize)]
struct ArkImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    size: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<&'a str>,
    #[serde(flatten)]
    extra: &'a Map<String, Value>,
}

/// Ark adapter
pub struct ArkAdapter {
    client: Client,
}

impl ArkAdapter {
    /// Create a new Ark adapter with the default timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(300))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl Adapter for ArkAdapter {
    fn name(&self) -> &str {
        "ark"
    }

    fn init(&self, ctx: &mut RelayContext) {
        let base_url = ctx.channel.base_url.trim_end_matches('/');
        ctx.request_url = Some(format!("{}/api/v3/images/generations", base_url));
    }

    fn convert_image_request(&self, ctx: &RelayContext, request: &ImageRequest) -> Result<ConvertedRequest> {
        if ctx.relay_mode == RelayMode::ImageEdits {
            anyhow::bail!("Ark does not support image edits");
        }

        let ark_request = ArkImageRequest {
            model: &request.model,
            prompt: &request.prompt,
            size: &request.size,
            response_format: request.response_format.as_deref(),
            extra: &request.extra,
        };

        Ok(ConvertedRequest::Json(serde_json::to_value(ark_request)?))
    }

    async fn do_request(&self, ctx: &RelayContext, body: Bytes) -> Result<UpstreamResponse> {
        let url = ctx.request_url.as_deref().context("Request URL not initialized")?;
        debug!("Sending image request to Ark API: {}", url);

        let content_type = match (ctx.pass_through, ctx.inbound_content_type()) {
            (true, Some(content_type)) => content_type.to_string(),
            _ => "application/json".to_string(),
        };

        let builder = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body);

        let response = authorize(builder, ctx, "ARK_API_KEY")
            .send()
            .await
            .map_err(|e| {
                error!("Ark API request failed: {}", e);
                e
            })
            .context("Failed to send request to Ark API")?;

        Ok(UpstreamResponse::from_reqwest(response))
    }

    async fn do_response(&self, ctx: &RelayContext, response: UpstreamResponse) -> RelayResult<AdapterResponse> {
        if ctx.is_stream {
            return Ok(forward_event_stream(response));
        }
        reconcile_json(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ApiType;
    use crate::models::RelayRequest;
    use crate::relay::ChannelSettings;
    use serde_json::json;
    use std::sync::Arc;

    fn context(mode: RelayMode) -> RelayContext {
        let channel = ChannelSettings {
            name: "ark".to_string(),
            base_url: "https://ark.cn-beijing.volces.com".to_string(),
            ..Default::default()
        };
        let request = RelayRequest::Image(ImageRequest::default());
        RelayContext::new(Arc::new(request), ApiType::Ark, Arc::new(channel)).with_mode(mode)
    }

    #[test]
    fn test_request_url() {
        let adapter = ArkAdapter::new().unwrap();
        let mut ctx = context(RelayMode::ImageGenerations);
        adapter.init(&mut ctx);
        assert_eq!(
            ctx.request_url.as_deref(),
            Some("https://ark.cn-beijing.volces.com/api/v3/images/generations")
        );
    }

    #[test]
    fn test_convert_drops_openai_only_fields() {
        let adapter = ArkAdapter::new().unwrap();
        let ctx = context(RelayMode::ImageGenerations);
        let request: ImageRequest = serde_json::from_value(json!({
            "model": "doubao-seedream-3-0-t2i",
            "prompt": "a paper boat",
            "n": 2,
            "size": "1024x1024",
            "quality": "hd",
            "user": "u-1",
            "seed": 12,
            "watermark": false
        }))
        .unwrap();

        let value = match adapter.convert_image_request(&ctx, &request).unwrap() {
            ConvertedRequest::Json(value) => value,
            other => panic!("unexpected conversion: {:?}", other),
        };

        assert_eq!(
            value,
            json!({
                "model": "doubao-seedream-3-0-t2i",
                "prompt": "a paper boat",
                "size": "1024x1024",
                "seed": 12,
                "watermark": false
            })
        );
    }

    #[test]
    fn test_edits_are_rejected() {
        let adapter = ArkAdapter::new().unwrap();
        let ctx = context(RelayMode::ImageEdits);
        assert!(adapter.convert_image_request(&ctx, &ImageRequest::default()).is_err());
    }
}
