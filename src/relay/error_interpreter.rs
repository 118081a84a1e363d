//! Upstream error interpretation

use crate::adapters::UpstreamResponse;
use crate::utils::error::RelayError;
use crate::utils::logging::truncate_preview;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// Longest raw upstream body kept in an error message
const MAX_RAW_ERROR_LEN: usize = 512;

/// Bytes of an upstream error body read before the rest is dropped
const MAX_ERROR_BODY: usize = 64 * 1024;

/// Turns a non-success upstream response into a relay error
#[async_trait]
pub trait ErrorInterpreter: Send + Sync {
    async fn interpret(&self, response: UpstreamResponse) -> RelayError;
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorEnvelope {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
    #[serde(default)]
    code: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct FlatError {
    message: String,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
}

/// Interpreter for OpenAI-style error bodies
///
/// Understands `{"error": {"message", "type", "code"}}`, a flat
/// `{"message": ...}` object and falls back to the raw text.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiErrorInterpreter;

impl OpenAiErrorInterpreter {
    fn message_from_body(body: &[u8]) -> (String, Option<String>) {
        if let Ok(envelope) = serde_json::from_slice::<OpenAiErrorEnvelope>(body) {
            let detail = envelope.error;
            let error_type = detail.error_type.or_else(|| match detail.code {
                Some(Value::String(code)) => Some(code),
                _ => None,
            });
            return (detail.message, error_type);
        }

        if let Ok(flat) = serde_json::from_slice::<FlatError>(body) {
            return (flat.message, flat.error_type);
        }

        let text = String::from_utf8_lossy(body);
        (truncate_preview(text.trim(), MAX_RAW_ERROR_LEN), None)
    }
}

#[async_trait]
impl ErrorInterpreter for OpenAiErrorInterpreter {
    async fn interpret(&self, response: UpstreamResponse) -> RelayError {
        let status = response.status;

        let (message, error_type) = match response.prefix(MAX_ERROR_BODY).await {
            Ok(body) => Self::message_from_body(&body),
            Err(e) => {
                warn!("Failed to read upstream error body: {:#}", e);
                (String::new(), None)
            }
        };

        let message = if message.is_empty() {
            format!("Upstream returned status {}", status)
        } else {
            message
        };

        warn!(status = %status, "Upstream error: {}", message);
        RelayError::upstream(status, message, error_type)
    }
}
