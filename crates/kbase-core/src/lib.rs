//! kbase Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout kbase:
//! - Knowledge records and their canonical text form
//! - Search matches and query parameters
//! - Common error types
//! - Shared trait for completion (LLM) backends
//! - Configuration management

pub mod config;
pub mod record;

pub use config::{
    AppConfig, ConfigError, EmbeddingConfig, EmbeddingProvider, IndexBackend, IndexConfig,
    LlmConfig, LlmProvider, LoggingConfig, RagConfig, ServerConfig,
};
pub use record::{metadata_text, slugify, Metadata, Record, RecordInput, SCHEMA_VERSION};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for kbase operations
#[derive(Error, Debug)]
pub enum KbError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Embedding provider error: {0}")]
    Embedding(String),

    #[error("Vector index error: {0}")]
    Index(String),

    #[error("Completion provider error: {0}")]
    Completion(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl KbError {
    /// Stable machine-readable code for this error class
    pub fn kind(&self) -> &'static str {
        match self {
            KbError::Validation(_) => "VALIDATION_ERROR",
            KbError::Embedding(_) => "EMBEDDING_PROVIDER_ERROR",
            KbError::Index(_) => "INDEX_PROVIDER_ERROR",
            KbError::Completion(_) => "COMPLETION_PROVIDER_ERROR",
            KbError::Config(_) => "CONFIGURATION_ERROR",
            KbError::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the failure came from an external provider
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            KbError::Embedding(_) | KbError::Index(_) | KbError::Completion(_)
        )
    }
}

impl From<ConfigError> for KbError {
    fn from(err: ConfigError) -> Self {
        KbError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, KbError>;

// ============================================================================
// Search Types
// ============================================================================

/// Default number of matches returned for a query
pub const DEFAULT_TOP_K: usize = 3;

/// Upper bound on `top_k`, keeps response size and provider cost bounded
pub const MAX_TOP_K: usize = 20;

/// A stored entry returned by the vector index for a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    /// Entry identifier
    pub id: String,

    /// Cosine similarity (higher is better)
    pub score: f32,

    /// Record fields stored alongside the vector
    pub metadata: Metadata,
}

impl Match {
    /// Get a text field from the metadata
    pub fn text_field(&self, name: &str) -> Option<&str> {
        self.metadata
            .get(name)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Query parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Free-text question
    pub query: String,

    /// Number of nearest matches to retrieve
    pub top_k: usize,
}

impl QueryRequest {
    /// Create a new query with the default top-k
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Set top-k
    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    /// Check the query text and result count against `max_top_k`
    pub fn validate(&self, max_top_k: usize) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(KbError::Validation("query cannot be empty".to_string()));
        }
        if self.top_k == 0 || self.top_k > max_top_k {
            return Err(KbError::Validation(format!(
                "top_k must be between 1 and {max_top_k}, got {}",
                self.top_k
            )));
        }
        Ok(())
    }
}

/// How the query handler turns matches into a response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    /// Return the ranked matches only
    Matches,
    /// Render the best match through the answer template
    #[default]
    #[serde(alias = "top-match")]
    TopMatch,
    /// Ask the completion model to answer from all matches
    Synthesize,
}

impl std::str::FromStr for AnswerMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "matches" => Ok(Self::Matches),
            "top_match" | "top-match" => Ok(Self::TopMatch),
            "synthesize" => Ok(Self::Synthesize),
            _ => Err(ConfigError::InvalidValue {
                key: "ANSWER_MODE".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for AnswerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnswerMode::Matches => write!(f, "matches"),
            AnswerMode::TopMatch => write!(f, "top_match"),
            AnswerMode::Synthesize => write!(f, "synthesize"),
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Trait for LLM completion clients
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a completion for a prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Get client name for logging
    fn name(&self) -> &str;
}

// ============================================================================
// Tests
// ============================================================================
