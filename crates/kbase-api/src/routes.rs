//! API route definitions
//!
//! Author: hephaex@gmail.com

use crate::handlers::{health, ingest, query};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Liveness, readiness and counters
pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics))
}

/// Ingest and query endpoints
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ingest", post(ingest::ingest_handler))
        .route("/query", post(query::query_handler))
}
