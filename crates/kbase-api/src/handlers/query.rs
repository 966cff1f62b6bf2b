//! Query handler
//!
//! Author: hephaex@gmail.com

use super::ApiJson;
use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use kbase_core::{AnswerMode, Match, QueryRequest};
use kbase_rag::QueryOutcome;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Query request body
#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct QueryBody {
    /// Question text
    #[serde(default)]
    #[schema(example = "Why does the pump leak?")]
    pub query: String,

    /// Number of matches to retrieve (server default when absent)
    #[schema(example = 3)]
    pub top_k: Option<usize>,

    /// `matches`, `top_match` or `synthesize` (server default when absent)
    #[schema(value_type = Option<String>, example = "top_match")]
    pub mode: Option<AnswerMode>,
}

/// One ranked match
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MatchDto {
    #[schema(example = "pump-seal-leak")]
    pub id: String,

    /// Cosine similarity
    #[schema(example = 0.9)]
    pub score: f32,

    /// Stored record fields
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
}

impl From<Match> for MatchDto {
    fn from(m: Match) -> Self {
        Self {
            id: m.id,
            score: m.score,
            metadata: serde_json::Value::Object(m.metadata.into_iter().collect()),
        }
    }
}

/// Query response body
#[derive(Debug, Serialize, ToSchema)]
pub struct QueryResponse {
    /// `ok` or `no_match`
    #[schema(example = "ok")]
    pub status: String,

    /// Answer text; absent in `matches` mode and when nothing matched
    pub answer: Option<String>,

    /// Score of the best match
    #[schema(example = 0.9)]
    pub score: Option<f32>,

    /// Ranked matches, best first
    pub matches: Vec<MatchDto>,

    /// Answer mode used
    #[schema(example = "top_match")]
    pub mode: String,
}

impl From<QueryOutcome> for QueryResponse {
    fn from(outcome: QueryOutcome) -> Self {
        match outcome {
            QueryOutcome::NoMatch { mode } => Self {
                status: "no_match".to_string(),
                answer: None,
                score: None,
                matches: Vec::new(),
                mode: mode.to_string(),
            },
            QueryOutcome::Answered(answer) => Self {
                status: "ok".to_string(),
                answer: answer.answer,
                score: Some(answer.score),
                matches: answer.matches.into_iter().map(MatchDto::from).collect(),
                mode: answer.mode.to_string(),
            },
        }
    }
}

/// Retrieve matches and answer a question
#[utoipa::path(
    post,
    path = "/query",
    tag = "query",
    request_body = QueryBody,
    responses(
        (status = 200, description = "Query answered or nothing matched", body = QueryResponse),
        (status = 400, description = "Invalid request", body = crate::error::ApiError),
        (status = 502, description = "Provider failure", body = crate::error::ApiError)
    )
)]
pub async fn query_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<QueryBody>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let request = QueryRequest::new(req.query)
        .with_top_k(req.top_k.unwrap_or_else(|| state.kb.default_top_k()));

    let outcome = state.kb.query(request, req.mode).await?;

    Ok(Json(QueryResponse::from(outcome)))
}
