//! HTTP handlers module
//!
//! Contains all HTTP endpoint handling logic

pub mod health;
pub mod image;

use crate::adapters::AdapterRegistry;
use crate::config::{AppConfig, Settings};
use crate::middleware::{auth_middleware, request_logging_middleware};
use crate::relay::ImageRelay;
use crate::services::ChannelRouter;
use anyhow::Result;
use axum::{extract::DefaultBodyLimit, middleware, routing::get, routing::post, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    map_response_body::MapResponseBodyLayer,
    trace::TraceLayer,
};

/// Application state
#[derive(Debug, Clone)]
pub struct AppState {
    pub settings: Settings,
    pub app_config: Arc<AppConfig>,
    pub relay: ImageRelay,
    pub router: ChannelRouter,
}

impl AppState {
    /// Build the state with adapters for every configured channel type
    pub fn new(settings: Settings, app_config: AppConfig) -> Result<Self> {
        let registry = AdapterRegistry::from_config(&app_config, settings.relay.upstream_timeout())?;
        let relay = ImageRelay::new(Arc::new(registry), settings.relay.clone());
        Ok(Self::with_relay(settings, app_config, relay))
    }

    /// Build the state around an existing relay
    pub fn with_relay(settings: Settings, app_config: AppConfig, relay: ImageRelay) -> Self {
        let router = ChannelRouter::new(&app_config);
        Self {
            settings,
            app_config: Arc::new(app_config),
            relay,
            router,
        }
    }
}

/// Create application router
pub async fn create_router(settings: Settings, app_config: AppConfig) -> Result<Router> {
    let app_state = Arc::new(AppState::new(settings, app_config)?);
    Ok(router_with_state(app_state))
}

/// Create the router for a prepared state
pub fn router_with_state(app_state: Arc<AppState>) -> Router {
    let max_request_size = app_state.settings.request.max_request_size;

    // Create middleware stack
    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(MapResponseBodyLayer::new(axum::body::Body::new))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_request_size));

    Router::new()
        .route("/v1/images/generations", post(image::handle_generations))
        .route("/v1/images/edits", post(image::handle_edits))
        .route("/health", get(health::health_check))
        .layer(middleware::from_fn_with_state(app_state.clone(), auth_middleware))
        .layer(middleware::from_fn(request_logging_middleware))
        .with_state(app_state)
        .layer(middleware_stack)
}
