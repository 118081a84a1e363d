//! Image Relay Server
//!
//! HTTP relay for OpenAI-compatible image generation and edit requests
//! with multi-channel routing via JSON configuration

use anyhow::{Context, Result};
use imagerelay::config::LoggingConfig;
use imagerelay::{create_router, AppConfig, Settings};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load settings from environment (relay switches, timeouts, logging)
    let settings = Settings::new().context("Failed to load server settings")?;

    init_logging(&settings.logging)?;

    // Load channel configuration from JSON file (required)
    let app_config = AppConfig::load_default().context("Failed to load channel configuration")?;
    info!("📁 Channel configuration loaded: {} channels", app_config.channels.len());

    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);

    let app = create_router(settings, app_config).await?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("🚀 {} started!", imagerelay::version_info());
    info!("📝 Health check: http://{}/health", addr);
    info!("🖼️ Image endpoints: http://{}/v1/images/generations, /v1/images/edits", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start server: {}", e))?;

    Ok(())
}

/// Initialize logging system
fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = if logging.format == "json" {
        // JSON format logs (production environment)
        Box::new(
            tracing_subscriber::fmt()
                .with_env_filter(logging.level.as_str())
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .finish(),
        )
    } else {
        // Human readable format (development environment)
        Box::new(
            tracing_subscriber::fmt()
                .with_env_filter(logging.level.as_str())
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .finish(),
        )
    };

    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;

    info!("Logging system initialized");
    Ok(())
}
