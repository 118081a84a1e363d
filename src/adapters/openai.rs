//! OpenAI adapter
//!
//! OpenAI-compatible image API: JSON generations and multipart edits

use super::{authorize, build_client, forward_event_stream, reconcile_json};
use super::{Adapter, AdapterResponse, ConvertedRequest, UpstreamResponse};
use crate::models::ImageRequest;
use crate::relay::{RelayContext, RelayMode};
use crate::utils::error::RelayResult;
use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::body::Bytes;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

/// OpenAI adapter
pub struct OpenAiAdapter {
    client: Client,
}

impl OpenAiAdapter {
    /// Create a new OpenAI adapter with the default timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(300))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
        })
    }

    /// Boundary used when re-encoding an edit form
    fn boundary(ctx: &RelayContext) -> String {
        format!("imagerelay-{}", ctx.request_id.simple())
    }

    /// Re-encode the client's edit form with the mapped request fields
    fn convert_edit_form(&self, ctx: &RelayContext, request: &ImageRequest) -> Result<ConvertedRequest> {
        let mut form = ctx
            .cached_form()
            .context("Image edit request has no multipart form")?
            .clone();

        let fields = match serde_json::to_value(request)? {
            Value::Object(map) => map,
            _ => anyhow::bail!("Image request did not serialize to an object"),
        };
        for (name, value) in fields {
            match value {
                Value::String(s) => form.insert_field(name, s),
                Value::Null => {}
                other => form.insert_field(name, other.to_string()),
            }
        }

        Ok(ConvertedRequest::Raw(form.encode(&Self::boundary(ctx))))
    }

    fn content_type(ctx: &RelayContext) -> String {
        if ctx.pass_through {
            if let Some(content_type) = ctx.inbound_content_type() {
                return content_type.to_string();
            }
        }
        match ctx.relay_mode {
            RelayMode::ImageEdits => format!("multipart/form-data; boundary={}", Self::boundary(ctx)),
            RelayMode::ImageGenerations => "application/json".to_string(),
        }
    }
}

#[async_trait]
impl Adapter for OpenAiAdapter {
    fn name(&self) -> &str {
        "openai"
    }

    fn init(&self, ctx: &mut RelayContext) {
        let base_url = ctx.channel.base_url.trim_end_matches('/');
        ctx.request_url = Some(format!("{}/images/{}", base_url, ctx.relay_mode.endpoint()));
    }

    fn convert_image_request(&self, ctx: &RelayContext, request: &ImageRequest) -> Result<ConvertedRequest> {
        match ctx.relay_mode {
            RelayMode::ImageGenerations => Ok(ConvertedRequest::Json(serde_json::to_value(request)?)),
            RelayMode::ImageEdits => self.convert_edit_form(ctx, request),
        }
    }

    async fn do_request(&self, ctx: &RelayContext, body: Bytes) -> Result<UpstreamResponse> {
        let url = ctx.request_url.as_deref().context("Request URL not initialized")?;
        debug!("Sending image request to OpenAI API: {}", url);

        let builder = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, Self::content_type(ctx))
            .body(body);

        let response = authorize(builder, ctx, "OPENAI_API_KEY")
            .send()
            .await
            .map_err(|e| {
                error!("OpenAI API request failed: {}", e);
                e
            })
            .context("Failed to send request to OpenAI API")?;

        Ok(UpstreamResponse::from_reqwest(response))
    }

    async fn do_response(&self, ctx: &RelayContext, response: UpstreamResponse) -> RelayResult<AdapterResponse> {
        if ctx.is_stream {
            return Ok(forward_event_stream(response));
        }
        reconcile_json(response).await
    }
}
