//! Record ingestion handler
//!
//! Author: hephaex@gmail.com

use super::ApiJson;
use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use kbase_core::RecordInput;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

/// Ingest response body
#[derive(Debug, Serialize, ToSchema)]
pub struct IngestResponse {
    #[schema(example = "success")]
    pub status: String,

    /// Id the record was stored under
    #[schema(example = "pump-seal-leak")]
    pub id: String,

    /// Embedding dimension
    #[schema(example = 1536)]
    pub vector_dim: usize,
}

/// Validate, embed and upsert one record
#[utoipa::path(
    post,
    path = "/ingest",
    tag = "ingest",
    request_body = RecordInput,
    responses(
        (status = 200, description = "Record stored", body = IngestResponse),
        (status = 400, description = "Invalid record", body = crate::error::ApiError),
        (status = 502, description = "Provider failure", body = crate::error::ApiError)
    )
)]
pub async fn ingest_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(record): ApiJson<RecordInput>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let outcome = state.kb.ingest(record).await?;

    Ok(Json(IngestResponse {
        status: "success".to_string(),
        id: outcome.id,
        vector_dim: outcome.vector_dim,
    }))
}
