//! Image relay pipeline
//!
//! Runs one image generation or edit request through adapter dispatch,
//! request building, transport, response reconciliation, error
//! classification and usage accounting, in that order.

pub mod builder;
pub mod context;
pub mod error_interpreter;
pub mod model_mapping;
pub mod multipart;
pub mod param_override;
pub mod status_mapping;
pub mod usage;

pub use context::{ChannelSettings, RelayContext, RelayMode, StageTimer};
pub use error_interpreter::{ErrorInterpreter, OpenAiErrorInterpreter};
pub use multipart::{format_size, is_multipart_form, FilePart, ImageForm, ImageMetadata};
pub use status_mapping::StatusCodeMapping;
pub use usage::{QuotaConsumer, TracingQuotaConsumer};

use crate::adapters::AdapterRegistry;
use crate::config::RelaySettings;
use crate::models::{RelayRequest, Usage};
use crate::utils::error::{ErrorCode, ErrorContext, RelayError, RelayResult};
use axum::http::StatusCode;
use axum::response::Response;
use std::sync::Arc;
use tracing::info;

/// Result of a successful relay
#[derive(Debug)]
pub struct RelayOutcome {
    /// Normalized usage that was billed
    pub usage: Usage,
    /// Response to send to the client
    pub response: Response,
}

/// Image relay
///
/// Holds the shared, read-only collaborators of the pipeline.
#[derive(Clone)]
pub struct ImageRelay {
    registry: Arc<AdapterRegistry>,
    error_interpreter: Arc<dyn ErrorInterpreter>,
    quota: Arc<dyn QuotaConsumer>,
    settings: RelaySettings,
}

impl ImageRelay {
    pub fn new(registry: Arc<AdapterRegistry>, settings: RelaySettings) -> Self {
        Self {
            registry,
            error_interpreter: Arc::new(OpenAiErrorInterpreter),
            quota: Arc::new(TracingQuotaConsumer),
            settings,
        }
    }

    pub fn with_error_interpreter(mut self, interpreter: Arc<dyn ErrorInterpreter>) -> Self {
        self.error_interpreter = interpreter;
        self
    }

    pub fn with_quota_consumer(mut self, quota: Arc<dyn QuotaConsumer>) -> Self {
        self.quota = quota;
        self
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Relay one image request
    ///
    /// Quota is consumed exactly once on success and never on failure.
    pub async fn relay(&self, ctx: &mut RelayContext) -> RelayResult<RelayOutcome> {
        info!(
            request_id = %ctx.request_id,
            token_id = %ctx.token_id,
            user_id = %ctx.user_id,
            mode = ctx.relay_mode.endpoint(),
            "Image relay start"
        );

        let original = match ctx.request() {
            RelayRequest::Image(request) => request,
            other => {
                return Err(RelayError::new(
                    ErrorCode::InvalidRequestType,
                    format!("Invalid request type, expected image request, got {}", other.kind()),
                ))
            }
        };

        let mut request = original
            .isolated_copy()
            .relay_context(ErrorCode::RequestCopyError, "Failed to copy image request")?;
        ctx.checkpoint("deep_copy");

        let upstream_model = model_mapping::resolve_model(&ctx.channel.model_mapping, &request.model)
            .relay_context(ErrorCode::ChannelModelMappedError, "Failed to map model")?;
        request.model = upstream_model.clone();
        ctx.upstream_model = upstream_model;

        let adapter = self.registry.get(ctx.api_type)?;
        adapter.init(ctx);

        ctx.pass_through = self.settings.pass_through_request_enabled || ctx.channel.pass_through_body_enabled;
        let body = builder::build_request_body(adapter.as_ref(), ctx, &request, self.settings.debug_enabled)?;

        ctx.checkpoint("request_start");
        let response = tokio::time::timeout(self.settings.upstream_timeout(), adapter.do_request(ctx, body))
            .await
            .map_err(|_| RelayError::new(ErrorCode::DoRequestFailed, "Upstream request timed out"))?
            .map_err(|e| RelayError::new(ErrorCode::DoRequestFailed, format!("{:#}", e)))?;
        ctx.checkpoint("request_end");

        ctx.is_stream = ctx.is_stream || response.is_event_stream();

        if response.status != StatusCode::OK {
            let mut err = self.error_interpreter.interpret(response).await;
            ctx.channel.status_code_mapping.remap(&mut err);
            return Err(err);
        }

        let mut outcome = match adapter.do_response(ctx, response).await {
            Ok(outcome) => outcome,
            Err(mut err) => {
                ctx.channel.status_code_mapping.remap(&mut err);
                return Err(err);
            }
        };

        usage::normalize_usage(&mut outcome.usage, request.n);
        ctx.checkpoint("deal_response");

        let descriptor = if request.size.is_empty() {
            String::new()
        } else {
            let metadata = ctx
                .image_form(self.settings.multipart_timeout())
                .await?
                .map(ImageForm::image_metadata);
            usage::build_descriptor(&request, metadata.as_ref()).unwrap_or_default()
        };

        self.quota.consume(ctx, &outcome.usage, &descriptor);

        Ok(RelayOutcome {
            usage: outcome.usage,
            response: outcome.response,
        })
    }
}

impl std::fmt::Debug for ImageRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageRelay")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
