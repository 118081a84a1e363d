//! Logging utilities
//!
//! Shared logging configuration and helper functions

use crate::models::ImageRequest;

/// Set to true to include full request details (prompts, extra fields) in logs
/// Default is false to reduce log verbosity
pub const VERBOSE_REQUEST_LOGGING: bool = false;

/// Longest body preview emitted by debug logging
pub const MAX_BODY_PREVIEW: usize = 2048;

/// Truncate a string with a note about original length
///
/// Cuts on a char boundary at or below `max_len` bytes.
pub fn truncate_preview(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }

    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} bytes truncated)", &s[..end], s.len() - end)
}

/// Printable preview of a request or response body
pub fn body_preview(body: &[u8], max_len: usize) -> String {
    match std::str::from_utf8(body) {
        Ok(text) => truncate_preview(text, max_len),
        Err(_) => format!("[{} bytes of binary data]", body.len()),
    }
}

/// Create a filtered summary of an image request for logging
pub fn create_request_log_summary(request: &ImageRequest) -> serde_json::Value {
    if VERBOSE_REQUEST_LOGGING {
        return serde_json::to_value(request).unwrap_or(serde_json::json!({"error": "serialize failed"}));
    }

    serde_json::json!({
        "model": request.model,
        "prompt": truncate_preview(&request.prompt, 100),
        "n": request.n,
        "size": request.size,
        "quality": request.quality,
        "response_format": request.response_format,
        "extra_fields": request.extra.keys().collect::<Vec<_>>(),
    })
}
