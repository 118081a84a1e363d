//! Authentication middleware
//!
//! Resolves relay API tokens and attaches the caller identity to the request

use crate::handlers::AppState;
use crate::utils::error::{ErrorBody, ErrorResponse};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Caller identity resolved from the bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenIdentity {
    pub token_id: String,
    pub user_id: String,
}

/// Authentication middleware
///
/// Validates the bearer token of every non-health request and inserts a
/// [`TokenIdentity`] extension for the handlers.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();

    // Skip authentication for health check endpoints
    if path.starts_with("/health") || path == "/" {
        return next.run(request).await;
    }

    let Some(key) = extract_bearer_token(&headers) else {
        warn!("Missing or malformed authorization header");
        return unauthorized("Missing bearer token");
    };

    match state.app_config.find_token(key) {
        Some(token) => {
            debug!("Authentication successful for token {}", token.id);
            request.extensions_mut().insert(TokenIdentity {
                token_id: token.id.clone(),
                user_id: token.user_id.clone(),
            });
            next.run(request).await
        }
        None => {
            warn!("Invalid API key");
            unauthorized("Invalid API key")
        }
    }
}

/// Extract the key from an `Authorization: Bearer <key>` header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    validate_token_format(token).then_some(token)
}

/// Validate token format
pub fn validate_token_format(token: &str) -> bool {
    !token.is_empty() && !token.contains(char::is_whitespace)
}

fn unauthorized(message: &str) -> Response {
    let body = ErrorResponse {
        error: ErrorBody {
            message: message.to_string(),
            error_type: "authentication_error".to_string(),
            code: "invalid_api_key".to_string(),
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, value.parse().unwrap());
        headers
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token(&headers("Bearer sk-relay-1")), Some("sk-relay-1"));
        assert_eq!(extract_bearer_token(&headers("Bearer  sk-relay-1 ")), Some("sk-relay-1"));
        assert_eq!(extract_bearer_token(&headers("sk-relay-1")), None);
        assert_eq!(extract_bearer_token(&headers("Bearer ")), None);
        assert_eq!(extract_bearer_token(&headers("Bearer two words")), None);
        assert_eq!(extract_bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_validate_token_format() {
        assert!(validate_token_format("sk-1234567890abcdef"));
        assert!(!validate_token_format(""));
        assert!(!validate_token_format("key with spaces"));
    }
}
