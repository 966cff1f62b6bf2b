//! Qdrant implementation for vector storage
//!
//! Provides connection management and vector operations
//! for record embeddings.
//!
//! Author: hephaex@gmail.com

use crate::{check_dimension, StoredEntry, VectorStore};
use async_trait::async_trait;
use kbase_core::{IndexConfig, KbError, Match, Metadata, Result};
use qdrant_client::qdrant::{
    vectors_config, CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Qdrant vector store implementation
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

/// Qdrant only accepts UUID or integer point ids; record ids map to UUIDv5
pub fn point_id(id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, id.as_bytes())
}

impl QdrantStore {
    /// Create a new Qdrant connection
    pub async fn new(config: &IndexConfig) -> Result<Self> {
        let client = Qdrant::from_url(&config.qdrant_url)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| KbError::Index(format!("Qdrant connection failed: {e}")))?;

        Ok(Self {
            client,
            collection: config.name.clone(),
            dimension: config.dimension,
        })
    }

    async fn collection_dimension(&self) -> Result<Option<usize>> {
        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(|e| KbError::Index(format!("Failed to describe collection: {e}")))?;

        info.result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .map(|config| vectors_dimension(&self.collection, config))
            .transpose()
    }
}

/// Dimension of an unnamed-vector collection; named vectors are not supported
fn vectors_dimension(collection: &str, config: vectors_config::Config) -> Result<usize> {
    match config {
        vectors_config::Config::Params(params) => Ok(params.size as usize),
        vectors_config::Config::ParamsMap(_) => Err(KbError::Config(format!(
            "collection {collection} uses named vectors; a single unnamed vector is required"
        ))),
    }
}

fn to_payload(metadata: &Metadata) -> HashMap<String, qdrant_client::qdrant::Value> {
    metadata
        .iter()
        .map(|(k, v)| (k.clone(), v.clone().into()))
        .collect()
}

fn from_payload(payload: HashMap<String, qdrant_client::qdrant::Value>) -> Metadata {
    payload
        .into_iter()
        .filter_map(|(k, v)| {
            let value = if let Some(s) = v.as_str() {
                serde_json::Value::from(s.as_str())
            } else if let Some(i) = v.as_integer() {
                serde_json::Value::from(i)
            } else if let Some(f) = v.as_double() {
                serde_json::Value::from(f)
            } else if let Some(b) = v.as_bool() {
                serde_json::Value::from(b)
            } else {
                return None;
            };
            Some((k, value))
        })
        .collect()
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_index(&self) -> Result<()> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(|e| KbError::Index(format!("Failed to list collections: {e}")))?;

        let exists = collections
            .collections
            .iter()
            .any(|c| c.name == self.collection);

        if exists {
            if let Some(actual) = self.collection_dimension().await? {
                check_dimension(&self.collection, self.dimension, actual)?;
            }
            return Ok(());
        }

        tracing::info!(
            collection = %self.collection,
            dimension = self.dimension,
            "Creating Qdrant collection"
        );

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection).vectors_config(
                    VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine),
                ),
            )
            .await
            .map_err(|e| KbError::Index(format!("Failed to create collection: {e}")))?;

        Ok(())
    }

    async fn upsert(&self, entry: &StoredEntry) -> Result<()> {
        let point = PointStruct::new(
            point_id(&entry.id).to_string(),
            entry.vector.clone(),
            to_payload(&entry.metadata),
        );

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]).wait(true))
            .await
            .map_err(|e| KbError::Index(format!("Failed to upsert vector: {e}")))?;

        Ok(())
    }

    async fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<Match>> {
        let results = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, query_vector.to_vec(), top_k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| KbError::Index(format!("Vector search failed: {e}")))?;

        Ok(results
            .result
            .into_iter()
            .map(|point| {
                let metadata = from_payload(point.payload);
                let id = metadata
                    .get("id")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or_default();

                Match {
                    id,
                    score: point.score,
                    metadata,
                }
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}
