//! kbase API Server
//!
//! REST API server for the kbase knowledge base.
//!
//! Author: hephaex@gmail.com

use anyhow::Context;
use kbase_api::{create_router, state::AppState};
use kbase_core::{AppConfig, LoggingConfig};
use kbase_rag::KnowledgeBase;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &logging.level;
        format!("kbase_api={level},kbase_rag={level},kbase_vector={level},tower_http=debug").into()
    });

    if logging.json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Wait for Ctrl-C, then report not-ready while in-flight requests drain
async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        return;
    }
    state.set_ready(false);
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = AppConfig::load().context("failed to load configuration")?;

    // Initialize tracing
    init_tracing(&config.logging);

    config.validate().context("invalid configuration")?;

    // Build provider clients once; handlers share them through the state
    let kb = KnowledgeBase::from_config(&config)
        .await
        .context("failed to initialize providers")?;
    kb.ensure_index()
        .await
        .context("failed to prepare vector index")?;

    let addr = format!("{}:{}", config.server.host, config.server.port);

    // Create application state
    let state = Arc::new(AppState::new(config, Arc::new(kb)));

    // Create router
    let app = create_router(state.clone());

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("kbase API Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}
