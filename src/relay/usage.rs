//! Usage accounting
//!
//! Token normalization, the billing descriptor and quota consumption.

use super::context::RelayContext;
use super::multipart::ImageMetadata;
use crate::models::{ImageRequest, Usage};
use tracing::info;

/// Fill usage fields the upstream left at zero with the image count
///
/// `total_tokens` and `prompt_tokens` are corrected independently. A
/// request for zero images still bills one.
pub fn normalize_usage(usage: &mut Usage, n: u32) {
    let fallback = n.max(1);
    if usage.total_tokens == 0 {
        usage.total_tokens = fallback;
    }
    if usage.prompt_tokens == 0 {
        usage.prompt_tokens = fallback;
    }
}

/// Billing quality tier; only an exact `"hd"` is high definition
pub fn quality_tier(quality: &str) -> &'static str {
    if quality == "hd" {
        "hd"
    } else {
        "standard"
    }
}

/// Human readable billing descriptor
///
/// Returns `None` when the request carries no size.
pub fn build_descriptor(request: &ImageRequest, metadata: Option<&ImageMetadata>) -> Option<String> {
    if request.size.is_empty() {
        return None;
    }

    let mut descriptor = format!(
        "size {}, quality {}, count {}",
        request.size,
        quality_tier(&request.quality),
        request.n
    );

    if let Some(meta) = metadata.filter(|meta| !meta.is_empty()) {
        descriptor.push_str(&format!(", input images {}", meta.count));
        if !meta.size_info.is_empty() {
            descriptor.push_str(&format!(" ({})", meta.size_info));
        }
    }

    Some(descriptor)
}

/// Records consumption of a successful request
pub trait QuotaConsumer: Send + Sync {
    fn consume(&self, ctx: &RelayContext, usage: &Usage, descriptor: &str);
}

/// Quota consumer writing a structured consume-log record
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingQuotaConsumer;

impl QuotaConsumer for TracingQuotaConsumer {
    fn consume(&self, ctx: &RelayContext, usage: &Usage, descriptor: &str) {
        info!(
            target: "imagerelay::consume",
            request_id = %ctx.request_id,
            token_id = %ctx.token_id,
            user_id = %ctx.user_id,
            channel = %ctx.channel.name,
            origin_model = %ctx.origin_model,
            upstream_model = %ctx.upstream_model,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            total_tokens = usage.total_tokens,
            is_stream = ctx.is_stream,
            elapsed_ms = ctx.elapsed().as_millis() as u64,
            "{}",
            descriptor
        );
    }
}
