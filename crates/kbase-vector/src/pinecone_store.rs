//! Pinecone implementation for vector storage
//!
//! Talks to the index data plane over REST. The index itself is created
//! through the Pinecone console or control plane; on startup its dimension
//! is checked against the embedding model.
//!
//! Author: hephaex@gmail.com

use crate::{check_dimension, StoredEntry, VectorStore};
use async_trait::async_trait;
use kbase_core::{IndexConfig, KbError, Match, Metadata, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_VERSION: &str = "2024-07";

/// Pinecone vector store implementation
pub struct PineconeStore {
    client: Client,
    host: String,
    api_key: String,
    index: String,
    namespace: Option<String>,
    dimension: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpsertRequest<'a> {
    vectors: Vec<PineconeVector<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct PineconeVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a Metadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<PineconeMatch>,
}

#[derive(Debug, Deserialize)]
struct PineconeMatch {
    id: String,
    score: f32,
    #[serde(default)]
    metadata: Metadata,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexStats {
    dimension: usize,
    #[serde(default)]
    total_vector_count: u64,
}

impl PineconeStore {
    /// Create a client for an index host
    pub fn new(
        host: impl Into<String>,
        api_key: impl Into<String>,
        index: impl Into<String>,
        dimension: usize,
    ) -> Self {
        Self {
            client: Client::new(),
            host: host.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            index: index.into(),
            namespace: None,
            dimension,
        }
    }

    /// Create from config
    pub fn from_config(config: &IndexConfig) -> Result<Self> {
        let api_key = config
            .pinecone_api_key
            .as_ref()
            .ok_or_else(|| KbError::Config("Pinecone API key required".to_string()))?;
        let host = config
            .pinecone_host
            .as_ref()
            .ok_or_else(|| KbError::Config("Pinecone index host required".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| KbError::Config(format!("Failed to build HTTP client: {e}")))?;

        let mut store = Self::new(host.clone(), api_key.clone(), config.name.clone(), config.dimension);
        store.client = client;
        store.namespace = config.namespace.clone();
        Ok(store)
    }

    /// Write to and read from a namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    async fn post<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<R> {
        let response = self
            .client
            .post(format!("{}/{endpoint}", self.host))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    KbError::Index(format!("Pinecone {endpoint} timed out"))
                } else {
                    KbError::Index(format!("Pinecone {endpoint} request failed: {e}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(KbError::Index(format!(
                "Pinecone {endpoint} error ({status}): {error_text}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| KbError::Index(format!("Failed to parse Pinecone {endpoint} response: {e}")))
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    async fn ensure_index(&self) -> Result<()> {
        let stats: IndexStats = self
            .post("describe_index_stats", &serde_json::json!({}))
            .await?;

        tracing::info!(
            index = %self.index,
            dimension = stats.dimension,
            vectors = stats.total_vector_count,
            "Pinecone index reachable"
        );

        check_dimension(&self.index, self.dimension, stats.dimension)
    }

    async fn upsert(&self, entry: &StoredEntry) -> Result<()> {
        let request = UpsertRequest {
            vectors: vec![PineconeVector {
                id: &entry.id,
                values: &entry.vector,
                metadata: &entry.metadata,
            }],
            namespace: self.namespace.as_deref(),
        };

        let _: serde_json::Value = self.post("vectors/upsert", &request).await?;
        Ok(())
    }

    async fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<Match>> {
        let request = QueryRequest {
            vector: query_vector,
            top_k,
            include_metadata: true,
            include_values: false,
            namespace: self.namespace.as_deref(),
        };

        let response: QueryResponse = self.post("query", &request).await?;

        Ok(response
            .matches
            .into_iter()
            .map(|m| Match {
                id: m.id,
                score: m.score,
                metadata: m.metadata,
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "pinecone"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &MockServer, dimension: usize) -> PineconeStore {
        PineconeStore::new(server.uri(), "pc-key", "kbase", dimension)
    }

    #[tokio::test]
    async fn test_upsert_sends_id_values_and_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/vectors/upsert"))
            .and(header("Api-Key", "pc-key"))
            .and(body_partial_json(json!({
                "vectors": [{
                    "id": "pump-leak",
                    "values": [0.5, 0.25],
                    "metadata": { "title": "Pump leak" }
                }],
                "namespace": "plant-a"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "upsertedCount": 1 })))
            .expect(1)
            .mount(&server)
            .await;

        let mut metadata = Metadata::new();
        metadata.insert("title".to_string(), json!("Pump leak"));
        let entry = StoredEntry {
            id: "pump-leak".to_string(),
            vector: vec![0.5, 0.25],
            metadata,
        };

        store(&server, 2)
            .with_namespace("plant-a")
            .upsert(&entry)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_search_parses_matches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .and(body_partial_json(json!({ "topK": 2, "includeMetadata": true })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "matches": [
                    { "id": "a", "score": 0.9, "metadata": { "title": "t", "problem": "p" } },
                    { "id": "b", "score": 0.4 }
                ],
                "namespace": ""
            })))
            .mount(&server)
            .await;

        let matches = store(&server, 2).search(&[0.1, 0.2], 2).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "a");
        assert_eq!(matches[0].text_field("problem"), Some("p"));
        assert!(matches[1].metadata.is_empty());
    }

    #[tokio::test]
    async fn test_ensure_index_dimension_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/describe_index_stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "dimension": 768,
                "totalVectorCount": 12,
                "namespaces": {}
            })))
            .mount(&server)
            .await;

        assert!(matches!(
            store(&server, 1536).ensure_index().await,
            Err(KbError::Config(_))
        ));
        assert!(store(&server, 768).ensure_index().await.is_ok());
    }

    #[tokio::test]
    async fn test_http_error_maps_to_index_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let err = store(&server, 2).search(&[0.1, 0.2], 1).await.unwrap_err();
        assert!(matches!(err, KbError::Index(msg) if msg.contains("bad key")));
    }
}
