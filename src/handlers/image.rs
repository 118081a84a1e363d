//! Image API handlers
//!
//! POST /v1/images/generations and POST /v1/images/edits

use crate::handlers::AppState;
use crate::middleware::TokenIdentity;
use crate::models::{ImageRequest, RelayRequest};
use crate::relay::{is_multipart_form, ImageForm, RelayContext, RelayMode};
use crate::utils::error::{ErrorBody, ErrorResponse};
use crate::utils::logging::create_request_log_summary;
use axum::{
    body::Bytes,
    extract::{Extension, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Handle image generation requests
///
/// POST /v1/images/generations
pub async fn handle_generations(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<TokenIdentity>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request: ImageRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Invalid image generation request: {}", e);
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "invalid_request",
                &format!("Invalid request body: {}", e),
            );
        }
    };

    relay_image(state, identity, &headers, body, request, None, RelayMode::ImageGenerations).await
}

/// Handle image edit requests
///
/// POST /v1/images/edits (multipart/form-data)
pub async fn handle_edits(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<TokenIdentity>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !is_multipart_form(content_type) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid_request_error",
            "invalid_request",
            "Image edits require a multipart/form-data body",
        );
    }

    let form = match ImageForm::parse(body.clone(), content_type).await {
        Ok(form) => form,
        Err(e) => {
            warn!("Invalid multipart form: {:#}", e);
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "invalid_request",
                &format!("Invalid multipart form: {:#}", e),
            );
        }
    };

    let request = match ImageRequest::from_form_fields(form.fields()) {
        Ok(request) => request,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "invalid_request",
                &format!("Invalid image edit fields: {}", e),
            );
        }
    };

    relay_image(state, identity, &headers, body, request, Some(form), RelayMode::ImageEdits).await
}

/// Route the request to a channel and run it through the relay
async fn relay_image(
    state: Arc<AppState>,
    identity: TokenIdentity,
    headers: &HeaderMap,
    body: Bytes,
    request: ImageRequest,
    form: Option<ImageForm>,
    mode: RelayMode,
) -> Response {
    if let Ok(summary) = serde_json::to_string(&create_request_log_summary(&request)) {
        debug!("📥 Image request: {}", summary);
    }

    let Some(channel) = state.router.route(&request.model) else {
        warn!("No channel serves model: {}", request.model);
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "invalid_request_error",
            "model_not_found",
            &format!("No available channel for model {}", request.model),
        );
    };

    let is_stream = matches!(request.extra.get("stream"), Some(Value::Bool(true)));
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut ctx = RelayContext::new(
        Arc::new(RelayRequest::Image(request)),
        channel.api_type,
        channel.settings.clone(),
    )
    .with_token(identity.token_id, identity.user_id)
    .with_mode(mode)
    .with_stream(is_stream)
    .with_body(body, content_type);

    if let Some(form) = form {
        ctx = ctx.with_form(form);
    }

    match state.relay.relay(&mut ctx).await {
        Ok(outcome) => outcome.response,
        Err(e) => e.into_response(),
    }
}

/// Create an OpenAI style error response
fn error_response(status: StatusCode, error_type: &str, code: &str, message: &str) -> Response {
    let body = ErrorResponse {
        error: ErrorBody {
            message: message.to_string(),
            error_type: error_type.to_string(),
            code: code.to_string(),
        },
    };
    (status, Json(body)).into_response()
}
