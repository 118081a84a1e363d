//! Error handling module
//!
//! Defines the relay error value returned by every failure path of the pipeline

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Relay error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Inbound request is not an image request
    InvalidRequestType,
    /// Isolated request copy could not be produced
    RequestCopyError,
    /// Channel model mapping failed
    ChannelModelMappedError,
    /// No adapter registered for the API type
    InvalidApiType,
    /// Raw inbound body could not be read for passthrough
    ReadRequestBodyFailed,
    /// Adapter conversion or body serialization failed
    ConvertRequestFailed,
    /// Parameter override could not be applied
    ChannelParamOverrideInvalid,
    /// Transport execution failed or timed out
    DoRequestFailed,
    /// Upstream answered with a non-success status
    UpstreamNonSuccess,
    /// Adapter response reconciliation failed
    DoResponseFailed,
}

impl ErrorCode {
    /// Stable string form, used as the `code` field of error bodies
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequestType => "invalid_request_type",
            ErrorCode::RequestCopyError => "request_copy_error",
            ErrorCode::ChannelModelMappedError => "channel_model_mapped_error",
            ErrorCode::InvalidApiType => "invalid_api_type",
            ErrorCode::ReadRequestBodyFailed => "read_request_body_failed",
            ErrorCode::ConvertRequestFailed => "convert_request_failed",
            ErrorCode::ChannelParamOverrideInvalid => "channel_param_override_invalid",
            ErrorCode::DoRequestFailed => "do_request_failed",
            ErrorCode::UpstreamNonSuccess => "upstream_non_success",
            ErrorCode::DoResponseFailed => "do_response_failed",
        }
    }

    /// Status used when the error is constructed without an explicit one
    pub fn default_status(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidRequestType | ErrorCode::ReadRequestBodyFailed => StatusCode::BAD_REQUEST,
            ErrorCode::UpstreamNonSuccess => StatusCode::BAD_GATEWAY,
            ErrorCode::RequestCopyError
            | ErrorCode::ChannelModelMappedError
            | ErrorCode::InvalidApiType
            | ErrorCode::ConvertRequestFailed
            | ErrorCode::ChannelParamOverrideInvalid
            | ErrorCode::DoRequestFailed
            | ErrorCode::DoResponseFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether errors of this kind are marked as not retryable on construction
    ///
    /// Transport and upstream failures leave the decision to the routing layer.
    pub fn skips_retry(&self) -> bool {
        !matches!(
            self,
            ErrorCode::DoRequestFailed | ErrorCode::UpstreamNonSuccess | ErrorCode::DoResponseFailed
        )
    }

    /// Whether the failure was caused by the upstream rather than local construction
    pub fn is_upstream(&self) -> bool {
        matches!(self, ErrorCode::UpstreamNonSuccess | ErrorCode::DoResponseFailed)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relay error
///
/// One value per failed request: kind, HTTP status, retry eligibility and
/// the status chosen by the channel's remapping policy.
#[derive(Error, Debug, Clone)]
#[error("{code}: {message}")]
pub struct RelayError {
    /// Error kind
    pub code: ErrorCode,
    /// Status as detected (upstream status for upstream failures)
    pub status: StatusCode,
    /// Human readable message
    pub message: String,
    /// Set when no layer should retry this request
    pub skip_retry: bool,
    /// Status substituted by the channel's status code mapping
    pub remapped_status: Option<StatusCode>,
    /// Error type reported by the upstream, if any
    pub upstream_type: Option<String>,
}

/// OpenAI compatible error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: String,
}

impl RelayError {
    /// Create an error with the kind's default status and retry policy
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            status: code.default_status(),
            message: message.into(),
            skip_retry: code.skips_retry(),
            remapped_status: None,
            upstream_type: None,
        }
    }

    /// Create an error with an explicit status
    pub fn with_status(code: ErrorCode, status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            ..Self::new(code, message)
        }
    }

    /// Upstream non-success error carrying the upstream status
    pub fn upstream(status: StatusCode, message: impl Into<String>, upstream_type: Option<String>) -> Self {
        Self {
            upstream_type,
            ..Self::with_status(ErrorCode::UpstreamNonSuccess, status, message)
        }
    }

    /// Mark the error as not retryable
    pub fn skip_retry(mut self) -> Self {
        self.skip_retry = true;
        self
    }

    /// Status visible to the client
    pub fn status_code(&self) -> StatusCode {
        self.remapped_status.unwrap_or(self.status)
    }

    pub fn is_retryable(&self) -> bool {
        !self.skip_retry
    }

    /// Get error type string
    pub fn error_type(&self) -> &str {
        match (&self.upstream_type, self.code.is_upstream()) {
            (Some(t), _) => t.as_str(),
            (None, true) => "upstream_error",
            (None, false) => "relay_error",
        }
    }

    /// Convert to the client-facing error body
    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorBody {
                message: self.message.clone(),
                error_type: self.error_type().to_string(),
                code: self.code.as_str().to_string(),
            },
        }
    }
}

/// Implement IntoResponse trait to allow errors to be returned directly as HTTP responses
impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(code = %self.code, status = %status, retryable = self.is_retryable(), "Relay error: {}", self.message);
        } else {
            tracing::warn!(code = %self.code, status = %status, "Client error: {}", self.message);
        }

        (status, Json(self.to_error_response())).into_response()
    }
}

/// Result type alias
pub type RelayResult<T> = Result<T, RelayError>;

/// Error context extension trait
///
/// Maps collaborator failures (anyhow, serde_json, ...) into typed relay errors.
pub trait ErrorContext<T> {
    /// Wrap the error into a relay error of the given kind
    fn relay_context(self, code: ErrorCode, message: &str) -> RelayResult<T>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: fmt::Display,
{
    fn relay_context(self, code: ErrorCode, message: &str) -> RelayResult<T> {
        self.map_err(|e| RelayError::new(code, format!("{}: {:#}", message, e)))
    }
}
