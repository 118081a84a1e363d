//! Logging middleware
//!
//! Records HTTP request and response information

use axum::{
    extract::Request,
    http::{header, HeaderMap, Method, Uri},
    middleware::Next,
    response::Response,
};
use std::time::{Duration, Instant};
use tracing::{info, warn, Instrument};
use uuid::Uuid;

/// Requests slower than this are reported
const SLOW_REQUEST_THRESHOLD: Duration = Duration::from_secs(30);

/// Request logging middleware
///
/// Runs each request inside an `http_request` span carrying a request id
pub async fn request_logging_middleware(
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let start_time = Instant::now();
    let request_id = Uuid::new_v4().to_string();

    let span = tracing::info_span!(
        "http_request",
        request_id = %request_id,
        method = %method,
        path = %uri.path(),
    );

    async move {
        info!(
            "Request started: {} {} - User-Agent: {}",
            method,
            uri,
            headers
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown")
        );

        if let Some(length) = content_length(&headers) {
            info!("Request body size: {} bytes", length);
        }

        let response = next.run(request).await;

        let duration = start_time.elapsed();
        let status = response.status();
        let duration_ms = duration.as_secs_f64() * 1000.0;

        if status.is_success() {
            info!("Request completed: {} - Duration: {:.2}ms", status, duration_ms);
        } else if status.is_client_error() {
            warn!("Client error: {} - Duration: {:.2}ms", status, duration_ms);
        } else if status.is_server_error() {
            warn!("Server error: {} - Duration: {:.2}ms", status, duration_ms);
        } else {
            info!("Request response: {} - Duration: {:.2}ms", status, duration_ms);
        }

        if duration > SLOW_REQUEST_THRESHOLD {
            warn!(
                "Slow request detected: {} {} - Duration: {:.2}s",
                method,
                uri,
                duration.as_secs_f64()
            );
        }

        response
    }
    .instrument(span)
    .await
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}
