//! kbase API - REST server
//!
//! Provides HTTP endpoints for ingesting records into the knowledge base and
//! querying it.
//!
//! Author: hephaex@gmail.com

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

use axum::{extract::DefaultBodyLimit, Router};
use handlers::{health, ingest, query};
use state::AppState;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// OpenAPI document
#[derive(OpenApi)]
#[openapi(
    info(title = "kbase API", description = "Ingest records and query the knowledge base"),
    paths(
        health::root,
        health::health_check,
        health::readiness_check,
        health::metrics,
        ingest::ingest_handler,
        query::query_handler,
    ),
    components(schemas(
        error::ApiError,
        health::RootResponse,
        health::HealthResponse,
        health::BuildInfo,
        health::ReadinessResponse,
        health::ReadinessChecks,
        health::MetricsResponse,
        kbase_core::RecordInput,
        ingest::IngestResponse,
        query::QueryBody,
        query::QueryResponse,
        query::MatchDto,
    )),
    tags(
        (name = "health", description = "Liveness and readiness"),
        (name = "ingest", description = "Record ingestion"),
        (name = "query", description = "Retrieval and answering"),
    )
)]
pub struct ApiDoc;

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let max_body_size = state.config.server.max_body_size;
    let cors_enabled = state.config.server.cors_enabled;

    let router = Router::new()
        .merge(routes::health_routes())
        .merge(routes::api_routes())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(TraceLayer::new_for_http());

    if cors_enabled {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    }
}

/// Router over stub providers (64-dimension embeddings, in-memory index)
#[cfg(feature = "test-utils")]
pub fn create_router_for_testing() -> Router {
    use kbase_core::AppConfig;
    use kbase_rag::testing::{RecordingStore, StubEmbedding, StubLlm};
    use kbase_rag::{KnowledgeBase, PipelineConfig};

    let config = AppConfig::default();
    let kb = KnowledgeBase::new(
        Arc::new(StubEmbedding::new(64)),
        Arc::new(RecordingStore::new(64)),
        PipelineConfig::from(&config.rag),
    )
    .with_llm(Arc::new(StubLlm::new("stub answer")));

    create_router(Arc::new(AppState::new(config, Arc::new(kb))))
}
