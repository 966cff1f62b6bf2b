//! API error handling
//!
//! Every failure leaves the server as a JSON `ApiError` with a proper status
//! code: 400 for caller errors, 502 for provider failures.
//!
//! Author: hephaex@gmail.com

use crate::handlers::query::MatchDto;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use kbase_core::KbError;
use kbase_rag::QueryFailure;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    #[schema(example = "VALIDATION_ERROR")]
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Matches retrieved before a completion failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matches: Option<Vec<MatchDto>>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            matches: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_matches(mut self, matches: Vec<MatchDto>) -> Self {
        self.matches = Some(matches);
        self
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    /// Caller error; never reached a provider
    BadRequest(String),
    /// Request body over the configured limit
    PayloadTooLarge(String),
    /// Embedding, index or completion provider failed
    Upstream {
        code: &'static str,
        message: String,
        matches: Option<Vec<MatchDto>>,
    },
    /// Server misconfiguration
    Config(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ApiError::new("VALIDATION_ERROR", msg),
            ),
            AppError::PayloadTooLarge(msg) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ApiError::new("VALIDATION_ERROR", msg),
            ),
            AppError::Upstream {
                code,
                message,
                matches,
            } => {
                tracing::warn!(code, "Upstream provider failure: {message}");
                let error = ApiError::new(code, "Upstream provider failed").with_details(message);
                let error = match matches {
                    Some(matches) => error.with_matches(matches),
                    None => error,
                };
                (StatusCode::BAD_GATEWAY, error)
            }
            AppError::Config(msg) => {
                tracing::error!("Configuration error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::new("CONFIGURATION_ERROR", "Service is misconfigured")
                        .with_details(msg),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::internal_error().with_details(msg),
                )
            }
        };

        (status, Json(error)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<KbError> for AppError {
    fn from(err: KbError) -> Self {
        let code = err.kind();
        match err {
            KbError::Validation(msg) => AppError::BadRequest(msg),
            KbError::Embedding(msg) | KbError::Index(msg) | KbError::Completion(msg) => {
                AppError::Upstream {
                    code,
                    message: msg,
                    matches: None,
                }
            }
            KbError::Config(msg) => AppError::Config(msg),
            KbError::Other(err) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<QueryFailure> for AppError {
    fn from(failure: QueryFailure) -> Self {
        let QueryFailure { error, matches } = failure;
        match AppError::from(error) {
            AppError::Upstream { code, message, .. } if !matches.is_empty() => {
                AppError::Upstream {
                    code,
                    message,
                    matches: Some(matches.into_iter().map(MatchDto::from).collect()),
                }
            }
            other => other,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(rejection.body_text())
        } else {
            AppError::BadRequest(rejection.body_text())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbase_core::Metadata;

    #[test]
    fn test_kb_error_mapping() {
        assert!(matches!(
            AppError::from(KbError::Validation("x".into())),
            AppError::BadRequest(_)
        ));
        assert!(matches!(
            AppError::from(KbError::Index("x".into())),
            AppError::Upstream { code: "INDEX_PROVIDER_ERROR", .. }
        ));
        assert!(matches!(
            AppError::from(KbError::Config("x".into())),
            AppError::Config(_)
        ));
    }

    #[test]
    fn test_query_failure_keeps_matches() {
        let failure = QueryFailure {
            error: KbError::Completion("timeout".into()),
            matches: vec![kbase_core::Match {
                id: "a".into(),
                score: 0.5,
                metadata: Metadata::new(),
            }],
        };
        match AppError::from(failure) {
            AppError::Upstream { code, matches, .. } => {
                assert_eq!(code, "COMPLETION_PROVIDER_ERROR");
                assert_eq!(matches.map(|m| m.len()), Some(1));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_status_codes() {
        let response = AppError::BadRequest("bad".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = AppError::from(KbError::Embedding("down".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
