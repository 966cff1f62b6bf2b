//! In-memory vector store using cosine similarity
//!
//! Backed by a `HashMap` behind a `tokio::sync::RwLock`. Nothing survives a
//! restart; meant for local development and tests.

use crate::{check_dimension, StoredEntry, VectorStore};
use async_trait::async_trait;
use kbase_core::{KbError, Match, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory vector store
#[derive(Debug)]
pub struct InMemoryStore {
    dimension: usize,
    entries: RwLock<HashMap<String, StoredEntry>>,
}

impl InMemoryStore {
    /// Create an empty store for vectors of `dimension`
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store holds no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Cosine similarity, 0.0 when either vector has zero magnitude
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn ensure_index(&self) -> Result<()> {
        if let Some(entry) = self.entries.read().await.values().next() {
            check_dimension("memory", self.dimension, entry.vector.len())?;
        }
        Ok(())
    }

    async fn upsert(&self, entry: &StoredEntry) -> Result<()> {
        if entry.vector.len() != self.dimension {
            return Err(KbError::Index(format!(
                "vector dimension {} does not match index dimension {}",
                entry.vector.len(),
                self.dimension
            )));
        }

        self.entries
            .write()
            .await
            .insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<Match>> {
        if query_vector.len() != self.dimension {
            return Err(KbError::Index(format!(
                "query dimension {} does not match index dimension {}",
                query_vector.len(),
                self.dimension
            )));
        }

        let entries = self.entries.read().await;
        let mut scored: Vec<Match> = entries
            .values()
            .map(|entry| Match {
                id: entry.id.clone(),
                score: cosine_similarity(&entry.vector, query_vector),
                metadata: entry.metadata.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "memory"
    }
}
