//! kbase RAG - Ingest and query pipeline
//!
//! Ingestion: validate a record, embed its canonical text, upsert
//! `(id, vector, metadata)` into the vector index.
//!
//! Query: embed the question, retrieve the nearest records, and answer in
//! one of three modes:
//! - `matches`: return the ranked matches only
//! - `top_match`: render the best match through the answer template
//! - `synthesize`: ask a completion model to answer from all matches
//!
//! Every request makes its provider calls strictly in sequence (embed, then
//! store/search, then optionally complete) and never retries.
//!
//! Author: hephaex@gmail.com

use kbase_core::{
    metadata_text, AnswerMode, AppConfig, KbError, LlmClient, Match, QueryRequest, RagConfig,
    Record, RecordInput, Result,
};
use kbase_vector::{EmbeddingClient, StoredEntry, VectorStore};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

pub mod llm;
pub mod prompt;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use llm::{create_llm_client, OllamaClient, OpenAiClient};
pub use prompt::{PromptTemplate, DEFAULT_TEMPLATE};

/// Text embedded by [`KnowledgeBase::ensure_index`] to measure the model's
/// output dimension
const DIMENSION_CHECK_TEXT: &str = "dimension check";

// ============================================================================
// Configuration
// ============================================================================

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Answer mode used when a query does not pick one
    pub answer_mode: AnswerMode,

    /// `top_k` used when a query does not set one
    pub default_top_k: usize,

    /// Largest accepted `top_k`
    pub max_top_k: usize,

    /// Matches scoring below this are dropped
    pub min_score: Option<f32>,

    /// Prompt for `synthesize` mode
    pub template: PromptTemplate,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&RagConfig::default())
    }
}

impl From<&RagConfig> for PipelineConfig {
    fn from(config: &RagConfig) -> Self {
        Self {
            answer_mode: config.answer_mode,
            default_top_k: config.default_top_k,
            max_top_k: config.max_top_k,
            min_score: config.min_score,
            template: PromptTemplate::default(),
        }
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Result of a successful ingest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    /// Id the entry was stored under
    pub id: String,

    /// Dimension of the stored vector
    pub vector_dim: usize,
}

/// Answer built from at least one match
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// Answer text; `None` in `matches` mode
    pub answer: Option<String>,

    /// Score of the best match
    pub score: f32,

    /// Ranked matches, best first
    pub matches: Vec<Match>,

    /// Mode that produced the answer
    pub mode: AnswerMode,
}

/// Result of a successful query
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome {
    /// Nothing in the index (above the score threshold) matched
    NoMatch { mode: AnswerMode },
    /// At least one match was found
    Answered(Answer),
}

/// A failed query, with any matches retrieved before the failure
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct QueryFailure {
    pub error: KbError,
    pub matches: Vec<Match>,
}

impl From<KbError> for QueryFailure {
    fn from(error: KbError) -> Self {
        Self {
            error,
            matches: Vec::new(),
        }
    }
}

// ============================================================================
// Knowledge base
// ============================================================================

/// Ingest/query pipeline over an embedding client and a vector store
pub struct KnowledgeBase {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    llm: Option<Arc<dyn LlmClient>>,
    config: PipelineConfig,
}

impl KnowledgeBase {
    /// Create a pipeline without a completion client
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn VectorStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            llm: None,
            config,
        }
    }

    /// Set the completion client used by `synthesize` mode
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Build all provider clients from application config
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let embedder = kbase_vector::create_embedding_client(&config.embedding)?;
        let store = kbase_vector::create_vector_store(&config.index).await?;

        let mut kb = Self::new(embedder, store, PipelineConfig::from(&config.rag));

        match create_llm_client(&config.llm) {
            Ok(llm) => kb = kb.with_llm(llm),
            Err(e) if config.rag.answer_mode == AnswerMode::Synthesize => return Err(e),
            Err(e) => tracing::debug!("Completion client disabled: {e}"),
        }

        Ok(kb)
    }

    /// Check embedding/index dimensions and create the index if needed
    ///
    /// The embedding side is measured by embedding a fixed text, so models
    /// missing from the provider tables are checked against what they
    /// really return.
    pub async fn ensure_index(&self) -> Result<()> {
        let index_dim = self.store.dimension();
        let embedding_dim = self.embedder.embed(DIMENSION_CHECK_TEXT).await?.len();
        if embedding_dim != index_dim {
            return Err(KbError::Config(format!(
                "embedding dimension {embedding_dim} does not match index dimension {index_dim}"
            )));
        }

        self.store.ensure_index().await?;
        tracing::info!(
            backend = self.store.name(),
            dimension = index_dim,
            "Vector index ready"
        );
        Ok(())
    }

    /// Answer mode used when a query does not pick one
    pub fn answer_mode(&self) -> AnswerMode {
        self.config.answer_mode
    }

    /// `top_k` used when a query does not set one
    pub fn default_top_k(&self) -> usize {
        self.config.default_top_k
    }

    /// Whether `synthesize` mode is available
    pub fn has_llm(&self) -> bool {
        self.llm.is_some()
    }

    /// Vector store backend name
    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    /// Validate, embed and upsert one record
    pub async fn ingest(&self, input: RecordInput) -> Result<IngestOutcome> {
        let record = Record::try_from(input)?;
        let id = record.resolve_id();
        let text = record.canonical_text();

        tracing::debug!(id = %id, chars = text.len(), "Embedding record");
        let vector = self.embedder.embed(&text).await?;
        let vector_dim = vector.len();

        let entry = StoredEntry {
            metadata: record.metadata(&id),
            id,
            vector,
        };
        self.store.upsert(&entry).await?;

        tracing::info!(id = %entry.id, vector_dim, "Ingested record");
        Ok(IngestOutcome {
            id: entry.id,
            vector_dim,
        })
    }

    /// Embed a question, retrieve matches and build the answer
    pub async fn query(
        &self,
        request: QueryRequest,
        mode: Option<AnswerMode>,
    ) -> std::result::Result<QueryOutcome, QueryFailure> {
        let start = Instant::now();
        let mode = mode.unwrap_or(self.config.answer_mode);
        request.validate(self.config.max_top_k)?;

        if mode == AnswerMode::Synthesize && self.llm.is_none() {
            return Err(KbError::Config("no completion provider configured".to_string()).into());
        }

        let vector = self.embedder.embed(request.query.trim()).await?;
        let mut matches = self.store.search(&vector, request.top_k).await?;
        tracing::debug!(
            backend = self.store.name(),
            matches = matches.len(),
            "Vector search completed"
        );

        if let Some(min_score) = self.config.min_score {
            matches.retain(|m| m.score >= min_score);
        }

        let Some(score) = matches.first().map(|m| m.score) else {
            tracing::info!("Query found no matches");
            return Ok(QueryOutcome::NoMatch { mode });
        };

        let answer = match mode {
            AnswerMode::Matches => None,
            AnswerMode::TopMatch => Some(render_match(&matches[0])),
            AnswerMode::Synthesize => match self.synthesize(&request.query, &matches).await {
                Ok(text) => Some(text),
                Err(error) => return Err(QueryFailure { error, matches }),
            },
        };

        tracing::info!(
            mode = %mode,
            matches = matches.len(),
            score,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Query answered"
        );

        Ok(QueryOutcome::Answered(Answer {
            answer,
            score,
            matches,
            mode,
        }))
    }

    async fn synthesize(&self, query: &str, matches: &[Match]) -> Result<String> {
        let llm = self
            .llm
            .as_ref()
            .ok_or_else(|| KbError::Config("no completion provider configured".to_string()))?;

        let prompt = self
            .config
            .template
            .render(&build_context(matches), query);
        tracing::debug!(provider = llm.name(), chars = prompt.len(), "Calling LLM");

        llm.generate(&prompt).await
    }
}

/// Answer template for the best match: title, then problem and solution
pub fn render_match(m: &Match) -> String {
    let mut parts = Vec::new();
    if let Some(title) = m.text_field("title") {
        parts.push(title.to_string());
    }
    if let Some(problem) = m.text_field("problem") {
        parts.push(format!("Problem: {problem}"));
    }
    if let Some(solution) = m.text_field("solution") {
        parts.push(format!("Solution: {solution}"));
    }
    parts.join("\n\n")
}

/// Numbered context block built from every match
pub fn build_context(matches: &[Match]) -> String {
    matches
        .iter()
        .enumerate()
        .map(|(i, m)| format!("[{}] {}", i + 1, metadata_text(&m.metadata)))
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ============================================================================
// Tests
// ============================================================================
