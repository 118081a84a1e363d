//! Raw upstream response handle

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::fmt;
use std::pin::Pin;
use tokio_stream::{Stream, StreamExt};

/// A boxed stream of body chunks
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Upstream response as seen by the pipeline
///
/// Status and headers are available up front; the body is consumed once.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    body: BoxStream<'static, Bytes>,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: BoxStream<'static, Bytes>) -> Self {
        Self { status, headers, body }
    }

    /// Response with a fully buffered body
    pub fn from_bytes(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(content_type) {
            headers.insert(header::CONTENT_TYPE, value);
        }
        let body: Bytes = body.into();
        Self::new(status, headers, Box::pin(tokio_stream::once(Ok::<Bytes, anyhow::Error>(body))))
    }

    /// Wrap a reqwest response without reading its body
    pub fn from_reqwest(response: reqwest::Response) -> Self {
        let status = StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);

        let mut headers = HeaderMap::with_capacity(response.headers().len());
        for (name, value) in response.headers() {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_str().as_bytes()),
                HeaderValue::from_bytes(value.as_bytes()),
            ) {
                headers.append(name, value);
            }
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.context("Failed to read upstream response chunk"));

        Self::new(status, headers, Box::pin(body))
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    /// Whether upstream answered with server-sent events
    pub fn is_event_stream(&self) -> bool {
        self.content_type()
            .map(|ct| ct.starts_with("text/event-stream"))
            .unwrap_or(false)
    }

    /// Read the whole body
    pub async fn bytes(mut self) -> Result<Bytes> {
        let mut buffer = Vec::new();
        while let Some(chunk) = self.body.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(buffer))
    }

    /// Read the whole body, failing once it grows past `limit` bytes
    pub async fn bytes_limited(mut self, limit: usize) -> Result<Bytes> {
        let mut buffer = Vec::new();
        while let Some(chunk) = self.body.next().await {
            let chunk = chunk?;
            if buffer.len() + chunk.len() > limit {
                anyhow::bail!("Upstream body exceeds {} bytes", limit);
            }
            buffer.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(buffer))
    }

    /// Read at most `limit` bytes and drop the rest of the body
    pub async fn prefix(mut self, limit: usize) -> Result<Bytes> {
        let mut buffer = Vec::new();
        while buffer.len() < limit {
            match self.body.next().await {
                Some(chunk) => {
                    let chunk = chunk?;
                    let take = chunk.len().min(limit - buffer.len());
                    buffer.extend_from_slice(&chunk[..take]);
                }
                None => break,
            }
        }
        Ok(Bytes::from(buffer))
    }

    /// Hand over the body stream for forwarding
    pub fn into_body_stream(self) -> BoxStream<'static, Bytes> {
        self.body
    }
}

impl fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}
