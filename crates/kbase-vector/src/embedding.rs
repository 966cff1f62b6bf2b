//! Embedding client for generating vector representations
//!
//! Supports OpenAI and Ollama embedding APIs.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use kbase_core::{EmbeddingConfig, EmbeddingProvider, KbError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

// ============================================================================
// Embedding Trait
// ============================================================================

/// Trait for embedding generation
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Declared embedding dimension; `None` when the model is not in the
    /// built-in table and no dimension was configured
    fn dimension(&self) -> Option<usize>;
}

fn build_http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| KbError::Config(format!("Failed to build HTTP client: {e}")))
}

fn request_error(provider: &str, e: reqwest::Error) -> KbError {
    if e.is_timeout() {
        KbError::Embedding(format!("{provider} embedding request timed out"))
    } else {
        KbError::Embedding(format!("{provider} embedding request failed: {e}"))
    }
}

/// Reject a vector whose length differs from the declared dimension
fn check_length(provider: &str, expected: Option<usize>, vector: Vec<f32>) -> Result<Vec<f32>> {
    match expected {
        Some(expected) if vector.len() != expected => Err(KbError::Embedding(format!(
            "{provider} returned {} dimensions, expected {expected}",
            vector.len()
        ))),
        _ => Ok(vector),
    }
}

/// Output dimension of well-known OpenAI embedding models
pub fn openai_model_dimension(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

/// Output dimension of well-known Ollama embedding models
pub fn ollama_model_dimension(model: &str) -> Option<usize> {
    match model {
        "nomic-embed-text" => Some(768),
        "mxbai-embed-large" => Some(1024),
        "all-minilm" => Some(384),
        _ => None,
    }
}

fn ensure_non_empty(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(KbError::Validation(
            "cannot embed an empty text".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// OpenAI Embedding Client
// ============================================================================

/// OpenAI embedding API client
pub struct OpenAiEmbedding {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    dimension: Option<usize>,
}

#[derive(Debug, Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAiEmbedding {
    /// Create a new OpenAI embedding client
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let dimension = openai_model_dimension(&model);

        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_string(),
            model,
            dimension,
        }
    }

    /// Create from config
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| KbError::Config("OpenAI API key required".to_string()))?;

        let mut client = Self::new(api_key.clone(), config.model.clone());
        client.client = build_http_client(config.timeout_secs)?;
        if let Some(url) = &config.openai_base_url {
            client.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(dimension) = config.dimension {
            client.dimension = Some(dimension);
        }
        Ok(client)
    }

    /// Set custom base URL (for compatible APIs)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Declare the model's output dimension
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        ensure_non_empty(text)?;

        let request = OpenAiEmbeddingRequest {
            input: text,
            model: &self.model,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error("OpenAI", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(KbError::Embedding(format!(
                "OpenAI embedding error ({status}): {error_text}"
            )));
        }

        let result: OpenAiEmbeddingResponse = response.json().await.map_err(|e| {
            KbError::Embedding(format!("Failed to parse embedding response: {e}"))
        })?;

        let vector = result
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| KbError::Embedding("No embedding returned".to_string()))?;

        check_length("OpenAI", self.dimension, vector)
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }
}

// ============================================================================
// Ollama Embedding Client
// ============================================================================

/// Ollama embedding API client
pub struct OllamaEmbedding {
    client: Client,
    base_url: String,
    model: String,
    dimension: Option<usize>,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedding {
    /// Create a new Ollama embedding client
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let dimension = ollama_model_dimension(&model);

        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model,
            dimension,
        }
    }

    /// Create from config
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let mut client = Self::new(
            config.ollama_url.trim_end_matches('/'),
            config.model.clone(),
        );
        client.client = build_http_client(config.timeout_secs)?;
        if let Some(dimension) = config.dimension {
            client.dimension = Some(dimension);
        }
        Ok(client)
    }

    /// Declare the model's output dimension
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        ensure_non_empty(text)?;

        let request = OllamaEmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error("Ollama", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(KbError::Embedding(format!(
                "Ollama embedding error ({status}): {error_text}"
            )));
        }

        let result: OllamaEmbeddingResponse = response.json().await.map_err(|e| {
            KbError::Embedding(format!("Failed to parse embedding response: {e}"))
        })?;

        if result.embedding.is_empty() {
            return Err(KbError::Embedding("No embedding returned".to_string()));
        }
        check_length("Ollama", self.dimension, result.embedding)
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create an embedding client from config
pub fn create_embedding_client(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingClient>> {
    match config.provider {
        EmbeddingProvider::OpenAI => Ok(Arc::new(OpenAiEmbedding::from_config(config)?)),
        EmbeddingProvider::Ollama => Ok(Arc::new(OllamaEmbedding::from_config(config)?)),
    }
}

// ============================================================================
// Tests
// ============================================================================
