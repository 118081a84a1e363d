//! Per-request relay state

use super::multipart::{is_multipart_form, ImageForm};
use super::status_mapping::StatusCodeMapping;
use crate::adapters::ApiType;
use crate::config::ChannelConfig;
use crate::models::RelayRequest;
use crate::utils::error::{ErrorCode, RelayError, RelayResult};
use axum::body::Bytes;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{info, warn};
use uuid::Uuid;

/// Image endpoint being relayed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    ImageGenerations,
    ImageEdits,
}

impl RelayMode {
    /// Path segment under `/images/`
    pub fn endpoint(&self) -> &'static str {
        match self {
            RelayMode::ImageGenerations => "generations",
            RelayMode::ImageEdits => "edits",
        }
    }
}

/// Read-only channel settings shared by all requests on a channel
#[derive(Debug, Clone, Default)]
pub struct ChannelSettings {
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    pub pass_through_body_enabled: bool,
    pub param_override: Map<String, Value>,
    pub model_mapping: HashMap<String, String>,
    pub status_code_mapping: StatusCodeMapping,
    pub headers: HashMap<String, String>,
}

impl ChannelSettings {
    pub fn from_config(name: &str, config: &ChannelConfig) -> Self {
        Self {
            name: name.to_string(),
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            pass_through_body_enabled: config.pass_through_body,
            param_override: config.param_override.clone(),
            model_mapping: config.model_mapping.clone(),
            status_code_mapping: StatusCodeMapping::parse_lenient(&config.status_code_mapping),
            headers: config.headers.clone(),
        }
    }
}

/// Timing checkpoints of one execution
#[derive(Debug, Clone, Copy)]
pub struct StageTimer {
    started: Instant,
    last: Instant,
}

impl StageTimer {
    pub fn start() -> Self {
        let now = Instant::now();
        Self { started: now, last: now }
    }

    /// Time since the previous checkpoint
    pub fn checkpoint(&mut self) -> Duration {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last);
        self.last = now;
        elapsed
    }

    /// Time since the execution started
    pub fn total(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Relay context
///
/// Owned by exactly one pipeline execution.
#[derive(Debug)]
pub struct RelayContext {
    pub request_id: Uuid,
    pub token_id: String,
    pub user_id: String,
    pub api_type: ApiType,
    pub relay_mode: RelayMode,
    pub channel: Arc<ChannelSettings>,
    /// Model named by the client
    pub origin_model: String,
    /// Model sent upstream after mapping
    pub upstream_model: String,
    pub is_stream: bool,
    /// Whether the raw client body is forwarded verbatim
    pub pass_through: bool,
    /// Upstream URL, set by the adapter's `init`
    pub request_url: Option<String>,
    request: Arc<RelayRequest>,
    body: Option<Bytes>,
    content_type: Option<String>,
    form: OnceCell<Option<ImageForm>>,
    timer: StageTimer,
}

impl RelayContext {
    pub fn new(request: Arc<RelayRequest>, api_type: ApiType, channel: Arc<ChannelSettings>) -> Self {
        let origin_model = request
            .as_image()
            .map(|image| image.model.clone())
            .unwrap_or_default();

        Self {
            request_id: Uuid::new_v4(),
            token_id: String::new(),
            user_id: String::new(),
            api_type,
            relay_mode: RelayMode::ImageGenerations,
            channel,
            upstream_model: origin_model.clone(),
            origin_model,
            is_stream: false,
            pass_through: false,
            request_url: None,
            request,
            body: None,
            content_type: None,
            form: OnceCell::new(),
            timer: StageTimer::start(),
        }
    }

    pub fn with_token(mut self, token_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.token_id = token_id.into();
        self.user_id = user_id.into();
        self
    }

    pub fn with_mode(mut self, mode: RelayMode) -> Self {
        self.relay_mode = mode;
        self
    }

    pub fn with_stream(mut self, is_stream: bool) -> Self {
        self.is_stream = is_stream;
        self
    }

    /// Attach the buffered client body
    pub fn with_body(mut self, body: Bytes, content_type: Option<String>) -> Self {
        self.body = Some(body);
        self.content_type = content_type;
        self
    }

    /// Attach an already decoded multipart form
    pub fn with_form(self, form: ImageForm) -> Self {
        // A fresh cell cannot already be initialized
        let _ = self.form.set(Some(form));
        self
    }

    pub fn request(&self) -> &RelayRequest {
        &self.request
    }

    /// Client body exactly as received
    pub fn raw_body(&self) -> RelayResult<Bytes> {
        self.body.clone().ok_or_else(|| {
            RelayError::new(ErrorCode::ReadRequestBodyFailed, "Request body is not available")
        })
    }

    pub fn inbound_content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Multipart form if it has already been materialized
    pub fn cached_form(&self) -> Option<&ImageForm> {
        self.form.get().and_then(Option::as_ref)
    }

    /// Materialize the multipart form of the client body, at most once
    ///
    /// Returns `None` for non-multipart or undecodable bodies. Exceeding
    /// `timeout` fails the request as a transport failure.
    pub async fn image_form(&self, timeout: Duration) -> RelayResult<Option<&ImageForm>> {
        let form = self
            .form
            .get_or_try_init(|| async {
                tokio::time::timeout(timeout, self.decode_form())
                    .await
                    .map_err(|_| {
                        RelayError::new(ErrorCode::DoRequestFailed, "Timed out reading multipart form")
                    })
            })
            .await?;
        Ok(form.as_ref())
    }

    async fn decode_form(&self) -> Option<ImageForm> {
        let content_type = self.content_type.as_deref()?;
        if !is_multipart_form(content_type) {
            return None;
        }
        let body = self.body.clone()?;

        match ImageForm::parse(body, content_type).await {
            Ok(form) => Some(form),
            Err(e) => {
                warn!(request_id = %self.request_id, "Failed to decode multipart form: {:#}", e);
                None
            }
        }
    }

    /// Log the end of a pipeline stage with the time spent since the previous one
    pub fn checkpoint(&mut self, stage: &'static str) {
        let elapsed = self.timer.checkpoint();
        info!(
            request_id = %self.request_id,
            token_id = %self.token_id,
            user_id = %self.user_id,
            stage,
            elapsed_ms = elapsed.as_millis() as u64,
            "Relay stage complete"
        );
    }

    /// Time since the context was created
    pub fn elapsed(&self) -> Duration {
        self.timer.total()
    }
}
