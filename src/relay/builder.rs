//! Transport body construction

use super::context::RelayContext;
use super::param_override::apply_param_override;
use crate::adapters::{Adapter, ConvertedRequest};
use crate::models::ImageRequest;
use crate::utils::error::{ErrorCode, ErrorContext, RelayError, RelayResult};
use crate::utils::logging::{body_preview, MAX_BODY_PREVIEW};
use axum::body::Bytes;
use tracing::debug;

/// Produce the body sent upstream
///
/// In passthrough mode the client body is forwarded verbatim and the adapter
/// is not asked to convert. Otherwise a raw conversion is used as-is and a
/// JSON conversion is serialized, then the channel's parameter override is
/// applied to the serialized bytes.
pub fn build_request_body(
    adapter: &dyn Adapter,
    ctx: &RelayContext,
    request: &ImageRequest,
    debug_enabled: bool,
) -> RelayResult<Bytes> {
    if ctx.pass_through {
        let body = ctx.raw_body()?;
        debug!(request_id = %ctx.request_id, "Passing through {} byte request body", body.len());
        return Ok(body);
    }

    let converted = adapter
        .convert_image_request(ctx, request)
        .map_err(|e| RelayError::new(ErrorCode::ConvertRequestFailed, format!("{:#}", e)))?;

    let json = match converted {
        ConvertedRequest::Raw(body) => return Ok(body),
        ConvertedRequest::Json(value) => serde_json::to_vec(&value)
            .relay_context(ErrorCode::ConvertRequestFailed, "Failed to serialize converted request")?,
    };

    let json = if ctx.channel.param_override.is_empty() {
        json
    } else {
        apply_param_override(&json, &ctx.channel.param_override)
            .relay_context(ErrorCode::ChannelParamOverrideInvalid, "Invalid channel param override")?
    };

    if debug_enabled {
        debug!(
            request_id = %ctx.request_id,
            "Image request body: {}",
            body_preview(&json, MAX_BODY_PREVIEW)
        );
    }

    Ok(Bytes::from(json))
}
