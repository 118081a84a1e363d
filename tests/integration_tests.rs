//! Integration tests
//!
//! Test end-to-end functionality of the entire application against a mock upstream

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use httpmock::prelude::*;
use imagerelay::config::{AppConfig, Settings};
use imagerelay::handlers::create_router;
use imagerelay::relay::{FilePart, ImageForm};
use serde_json::{json, Value};
use tower::ServiceExt;

const CLIENT_KEY: &str = "sk-relay-client";

/// Create test app config pointing every channel at `server`
fn create_test_app_config(server: &MockServer) -> AppConfig {
    serde_json::from_value(json!({
        "channels": {
            "ark": {
                "type": "ark",
                "baseUrl": server.base_url(),
                "apiKey": "ark-upstream-key",
                "models": ["doubao-seedream-3-0-t2i"],
                "paramOverride": {"watermark": false}
            },
            "openai": {
                "type": "openai",
                "baseUrl": server.url("/v1"),
                "apiKey": "sk-upstream",
                "models": ["dall-e-3", "gpt-image-1"],
                "modelMapping": {"dall-e-3": "gpt-image-1"},
                "statusCodeMapping": "{\"429\":\"503\"}",
                "headers": {"X-Channel": "openai-test"}
            }
        },
        "tokens": [
            {"key": CLIENT_KEY, "id": "tok-1", "userId": "user-1"}
        ]
    }))
    .expect("valid test config")
}

async fn create_app(server: &MockServer) -> Router {
    create_router(Settings::default(), create_test_app_config(server))
        .await
        .expect("Failed to create router")
}

fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", CLIENT_KEY))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_check_endpoint() {
    let server = MockServer::start_async().await;
    let app = create_app(&server).await;

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let health = read_json(response).await;
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["service"], "imagerelay");
    assert_eq!(health["details"]["channels"], 2);
}

#[tokio::test]
async fn test_missing_token_is_rejected() {
    let server = MockServer::start_async().await;
    let app = create_app(&server).await;

    let request = Request::builder()
        .method("POST")
        .uri("/v1/images/generations")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"model": "dall-e-3", "prompt": "x"}).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(response).await;
    assert_eq!(body["error"]["type"], "authentication_error");
}

#[tokio::test]
async fn test_unknown_token_is_rejected() {
    let server = MockServer::start_async().await;
    let app = create_app(&server).await;

    let mut request = json_request("/v1/images/generations", json!({"model": "dall-e-3", "prompt": "x"}));
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, "Bearer sk-unknown".parse().unwrap());

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_generation_is_relayed_with_mapped_model() {
    let server = MockServer::start_async().await;
    let upstream = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/images/generations")
                .header("authorization", "Bearer sk-upstream")
                .header("x-channel", "openai-test")
                .json_body_partial(r#"{"model": "gpt-image-1", "prompt": "a lighthouse", "size": "1024x1024"}"#);
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "created": 1713833628,
                    "data": [{"b64_json": "aGVsbG8="}],
                    "usage": {"input_tokens": 50, "output_tokens": 4160, "total_tokens": 4210}
                }));
        })
        .await;

    let app = create_app(&server).await;
    let response = app
        .oneshot(json_request(
            "/v1/images/generations",
            json!({"model": "dall-e-3", "prompt": "a lighthouse", "size": "1024x1024", "quality": "hd"}),
        ))
        .await
        .unwrap();

    upstream.assert_async().await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"][0]["b64_json"], "aGVsbG8=");
    assert_eq!(body["usage"]["total_tokens"], 4210);
}

#[tokio::test]
async fn test_upstream_error_status_is_remapped() {
    let server = MockServer::start_async().await;
    let upstream = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/images/generations");
            then.status(429)
                .header("content-type", "application/json")
                .json_body(json!({"error": {"message": "Rate limit reached", "type": "rate_limit_error"}}));
        })
        .await;

    let app = create_app(&server).await;
    let response = app
        .oneshot(json_request("/v1/images/generations", json!({"model": "gpt-image-1", "prompt": "x"})))
        .await
        .unwrap();

    upstream.assert_async().await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = read_json(response).await;
    assert_eq!(body["error"]["message"], "Rate limit reached");
    assert_eq!(body["error"]["type"], "rate_limit_error");
    assert_eq!(body["error"]["code"], "upstream_non_success");
}

#[tokio::test]
async fn test_unmapped_upstream_error_keeps_status() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/images/generations");
            then.status(400).body("content policy violation");
        })
        .await;

    let app = create_app(&server).await;
    let response = app
        .oneshot(json_request("/v1/images/generations", json!({"model": "gpt-image-1", "prompt": "x"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["error"]["message"], "content policy violation");
}

#[tokio::test]
async fn test_unknown_model() {
    let server = MockServer::start_async().await;
    let app = create_app(&server).await;

    let response = app
        .oneshot(json_request("/v1/images/generations", json!({"model": "midjourney", "prompt": "x"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = read_json(response).await;
    assert_eq!(body["error"]["code"], "model_not_found");
}

#[tokio::test]
async fn test_invalid_json_body() {
    let server = MockServer::start_async().await;
    let app = create_app(&server).await;

    let mut request = json_request("/v1/images/generations", json!({}));
    *request.body_mut() = Body::from("{not json");

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_edit_is_reencoded_for_upstream() {
    let server = MockServer::start_async().await;
    let upstream = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/images/edits")
                .body_contains("gpt-image-1")
                .body_contains("add a hat");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"created": 1, "data": [{"url": "https://img.example/edit.png"}]}));
        })
        .await;

    let mut form = ImageForm::new();
    form.insert_field("model", "dall-e-3");
    form.insert_field("prompt", "add a hat");
    form.insert_field("size", "512x512");
    form.insert_file("image", FilePart::new("cat.png", vec![9u8; 2048]));
    let body = form.encode("client-boundary");

    let request = Request::builder()
        .method("POST")
        .uri("/v1/images/edits")
        .header(header::AUTHORIZATION, format!("Bearer {}", CLIENT_KEY))
        .header(header::CONTENT_TYPE, "multipart/form-data; boundary=client-boundary")
        .body(Body::from(body))
        .unwrap();

    let app = create_app(&server).await;
    let response = app.oneshot(request).await.unwrap();

    upstream.assert_async().await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"][0]["url"], "https://img.example/edit.png");
}

#[tokio::test]
async fn test_edit_accepts_mixed_case_content_type() {
    let server = MockServer::start_async().await;
    let upstream = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/images/edits").body_contains("add a scarf");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"created": 1, "data": [{"url": "https://img.example/scarf.png"}]}));
        })
        .await;

    let mut form = ImageForm::new();
    form.insert_field("model", "gpt-image-1");
    form.insert_field("prompt", "add a scarf");
    form.insert_file("image", FilePart::new("dog.png", vec![3u8; 256]));

    let request = Request::builder()
        .method("POST")
        .uri("/v1/images/edits")
        .header(header::AUTHORIZATION, format!("Bearer {}", CLIENT_KEY))
        .header(header::CONTENT_TYPE, "Multipart/Form-Data; boundary=MixedCase")
        .body(Body::from(form.encode("MixedCase")))
        .unwrap();

    let app = create_app(&server).await;
    let response = app.oneshot(request).await.unwrap();

    upstream.assert_async().await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_edit_requires_multipart() {
    let server = MockServer::start_async().await;
    let app = create_app(&server).await;

    let response = app
        .oneshot(json_request("/v1/images/edits", json!({"model": "gpt-image-1", "prompt": "x"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ark_generation_with_override() {
    let server = MockServer::start_async().await;
    let upstream = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v3/images/generations")
                .header("authorization", "Bearer ark-upstream-key")
                .json_body_partial(r#"{"model": "doubao-seedream-3-0-t2i", "watermark": false, "seed": 7}"#);
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "model": "doubao-seedream-3-0-t2i",
                    "created": 1,
                    "data": [{"url": "https://ark.example/1.png"}],
                    "usage": {"generated_images": 1, "output_tokens": 4096, "total_tokens": 4096}
                }));
        })
        .await;

    let app = create_app(&server).await;
    let response = app
        .oneshot(json_request(
            "/v1/images/generations",
            json!({"model": "doubao-seedream-3-0-t2i", "prompt": "a paper boat", "seed": 7, "n": 1}),
        ))
        .await
        .unwrap();

    upstream.assert_async().await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_ark_rejects_edits() {
    let server = MockServer::start_async().await;
    let app = create_app(&server).await;

    let mut form = ImageForm::new();
    form.insert_field("model", "doubao-seedream-3-0-t2i");
    form.insert_field("prompt", "x");
    form.insert_file("image", FilePart::new("a.png", vec![1u8; 16]));

    let request = Request::builder()
        .method("POST")
        .uri("/v1/images/edits")
        .header(header::AUTHORIZATION, format!("Bearer {}", CLIENT_KEY))
        .header(header::CONTENT_TYPE, "multipart/form-data; boundary=b1")
        .body(Body::from(form.encode("b1")))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = read_json(response).await;
    assert_eq!(body["error"]["code"], "convert_request_failed");
}
