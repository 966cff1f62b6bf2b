//! kbase Vector - Embeddings and vector index abstraction
//!
//! Provides embedding clients (OpenAI, Ollama) and vector index backends
//! (Pinecone, Qdrant, in-memory) for storing and searching record embeddings.

use async_trait::async_trait;
use kbase_core::{IndexBackend, IndexConfig, Match, Metadata, Result};
use std::sync::Arc;

pub mod embedding;
pub mod memory_store;
pub mod pinecone_store;
pub mod qdrant_store;

pub use embedding::{create_embedding_client, EmbeddingClient, OllamaEmbedding, OpenAiEmbedding};
pub use memory_store::InMemoryStore;
pub use pinecone_store::PineconeStore;
pub use qdrant_store::QdrantStore;

/// A vector with its id and metadata, as written to the index
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: Metadata,
}

/// Trait for vector index operations
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the index if missing; fail on a dimension mismatch
    async fn ensure_index(&self) -> Result<()>;

    /// Insert or overwrite an entry by id
    async fn upsert(&self, entry: &StoredEntry) -> Result<()>;

    /// Search for the `top_k` nearest entries, best first
    async fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<Match>>;

    /// Dimension the index was configured with
    fn dimension(&self) -> usize;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Create a vector store from config
pub async fn create_vector_store(config: &IndexConfig) -> Result<Arc<dyn VectorStore>> {
    match config.backend {
        IndexBackend::Pinecone => Ok(Arc::new(PineconeStore::from_config(config)?)),
        IndexBackend::Qdrant => Ok(Arc::new(QdrantStore::new(config).await?)),
        IndexBackend::Memory => Ok(Arc::new(InMemoryStore::new(config.dimension))),
    }
}

/// Check a dimension reported by an existing index against the configured one
pub(crate) fn check_dimension(index: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(kbase_core::KbError::Config(format!(
            "index '{index}' has dimension {actual}, embeddings have dimension {expected}"
        )));
    }
    Ok(())
}
