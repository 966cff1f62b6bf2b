//! kbase Configuration Management
//!
//! Handles configuration from environment variables and TOML config files
//! with sensible defaults for development.

use crate::AnswerMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Embedding provider configuration
    pub embedding: EmbeddingConfig,

    /// Vector index configuration
    pub index: IndexConfig,

    /// Completion provider configuration
    pub llm: LlmConfig,

    /// Query pipeline configuration
    pub rag: RagConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(self) -> Result<Self, ConfigError> {
        self.apply_env()
    }

    /// Load from `KBASE_CONFIG` if set, then apply environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var("KBASE_CONFIG") {
            Ok(path) => Self::from_file(path)?.with_env_override(),
            Err(_) => Self::from_env(),
        }
    }

    fn apply_env(mut self) -> Result<Self, ConfigError> {
        // Server
        if let Ok(host) = std::env::var("API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse("API_PORT")? {
            self.server.port = port;
        }
        if let Some(enabled) = env_parse("CORS_ENABLED")? {
            self.server.cors_enabled = enabled;
        }

        // OpenAI credentials are shared by embedding and completion clients
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.embedding.openai_api_key = Some(key.clone());
            self.llm.openai_api_key = Some(key);
        }
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            self.embedding.openai_base_url = Some(url.clone());
            self.llm.openai_base_url = Some(url);
        }
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            self.embedding.ollama_url = url.clone();
            self.llm.ollama_url = url;
        }

        // Embedding
        if let Ok(provider) = std::env::var("EMBEDDING_PROVIDER") {
            self.embedding.provider = provider.parse()?;
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(dimension) = env_parse("EMBEDDING_DIMENSION")? {
            self.embedding.dimension = Some(dimension);
        }
        if let Some(secs) = env_parse("EMBEDDING_TIMEOUT_SECS")? {
            self.embedding.timeout_secs = secs;
        }

        // Vector index
        if let Ok(backend) = std::env::var("INDEX_BACKEND") {
            self.index.backend = backend.parse()?;
        }
        if let Ok(name) = std::env::var("INDEX_NAME") {
            self.index.name = name;
        }
        if let Some(dimension) = env_parse("INDEX_DIMENSION")? {
            self.index.dimension = dimension;
        }
        if let Ok(namespace) = std::env::var("INDEX_NAMESPACE") {
            self.index.namespace = Some(namespace);
        }
        if let Ok(key) = std::env::var("PINECONE_API_KEY") {
            self.index.pinecone_api_key = Some(key);
        }
        if let Ok(host) = std::env::var("PINECONE_HOST") {
            self.index.pinecone_host = Some(host);
        }
        if let Ok(url) = std::env::var("QDRANT_URL") {
            self.index.qdrant_url = url;
        }
        if let Some(secs) = env_parse("INDEX_TIMEOUT_SECS")? {
            self.index.timeout_secs = secs;
        }

        // LLM
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            self.llm.provider = provider.parse()?;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(secs) = env_parse("LLM_TIMEOUT_SECS")? {
            self.llm.timeout_secs = secs;
        }

        // RAG
        if let Ok(mode) = std::env::var("ANSWER_MODE") {
            self.rag.answer_mode = mode.parse()?;
        }
        if let Some(top_k) = env_parse("DEFAULT_TOP_K")? {
            self.rag.default_top_k = top_k;
        }
        if let Some(score) = env_parse("MIN_SCORE")? {
            self.rag.min_score = Some(score);
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = env_parse("LOG_JSON")? {
            self.logging.json_format = json;
        }

        Ok(self)
    }

    /// Check that every selected provider has what it needs
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding.provider == EmbeddingProvider::OpenAI
            && self.embedding.openai_api_key.is_none()
        {
            return Err(ConfigError::MissingRequired("OPENAI_API_KEY".to_string()));
        }

        if self.index.backend == IndexBackend::Pinecone {
            if self.index.pinecone_api_key.is_none() {
                return Err(ConfigError::MissingRequired("PINECONE_API_KEY".to_string()));
            }
            if self.index.pinecone_host.is_none() {
                return Err(ConfigError::MissingRequired("PINECONE_HOST".to_string()));
            }
        }

        if self.rag.answer_mode == AnswerMode::Synthesize
            && self.llm.provider != LlmProvider::Ollama
            && self.llm.openai_api_key.is_none()
        {
            return Err(ConfigError::MissingRequired("OPENAI_API_KEY".to_string()));
        }

        if self.rag.default_top_k == 0 || self.rag.default_top_k > self.rag.max_top_k {
            return Err(ConfigError::InvalidValue {
                key: "DEFAULT_TOP_K".to_string(),
                value: self.rag.default_top_k.to_string(),
            });
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Maximum request body size in bytes
    pub max_body_size: usize,

    /// Allow any origin, method and header
    pub cors_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_size: 1024 * 1024, // 1MB
            cors_enabled: true,
        }
    }
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding provider to use
    pub provider: EmbeddingProvider,

    /// Embedding model name
    pub model: String,

    /// Vector length the model returns; overrides the built-in model table
    pub dimension: Option<usize>,

    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL (for compatible APIs)
    pub openai_base_url: Option<String>,

    /// Ollama server URL
    pub ollama_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::OpenAI,
            model: "text-embedding-ada-002".to_string(),
            dimension: None,
            openai_api_key: None,
            openai_base_url: None,
            ollama_url: "http://localhost:11434".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Supported embedding providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    OpenAI,
    Ollama,
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(ConfigError::InvalidValue {
                key: "EMBEDDING_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Index backend to use
    pub backend: IndexBackend,

    /// Index (Pinecone) or collection (Qdrant) name
    pub name: String,

    /// Vector dimension (must match embedding model)
    pub dimension: usize,

    /// Namespace within the index
    pub namespace: Option<String>,

    /// Pinecone API key
    pub pinecone_api_key: Option<String>,

    /// Pinecone index host, e.g. `https://kb-abc123.svc.us-east-1.pinecone.io`
    pub pinecone_host: Option<String>,

    /// Qdrant gRPC URL
    pub qdrant_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::Pinecone,
            name: "kbase".to_string(),
            dimension: 1536, // OpenAI text-embedding-ada-002
            namespace: None,
            pinecone_api_key: None,
            pinecone_host: None,
            qdrant_url: "http://localhost:6334".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Supported vector index backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Pinecone,
    Qdrant,
    Memory,
}

impl std::str::FromStr for IndexBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pinecone" => Ok(Self::Pinecone),
            "qdrant" => Ok(Self::Qdrant),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::InvalidValue {
                key: "INDEX_BACKEND".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// LLM provider to use
    pub provider: LlmProvider,

    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL (for Azure or compatible APIs)
    pub openai_base_url: Option<String>,

    /// Ollama server URL
    pub ollama_url: String,

    /// Model name to use
    pub model: String,

    /// Maximum tokens for completion
    pub max_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            openai_api_key: None,
            openai_base_url: None,
            ollama_url: "http://localhost:11434".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1024,
            temperature: 0.1,
            timeout_secs: 60,
        }
    }
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Ollama,
    Azure,
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "azure" => Ok(Self::Azure),
            _ => Err(ConfigError::InvalidValue {
                key: "LLM_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Query pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// How answers are produced from matches
    pub answer_mode: AnswerMode,

    /// `top_k` used when a query does not set one
    pub default_top_k: usize,

    /// Largest accepted `top_k`
    pub max_top_k: usize,

    /// Matches scoring below this are dropped
    pub min_score: Option<f32>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            answer_mode: AnswerMode::TopMatch,
            default_top_k: crate::DEFAULT_TOP_K,
            max_top_k: crate::MAX_TOP_K,
            min_score: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.index.dimension, 1536);
        assert_eq!(config.rag.answer_mode, AnswerMode::TopMatch);
        assert!(config.server.cors_enabled);
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!(
            "openai".parse::<LlmProvider>().unwrap(),
            LlmProvider::OpenAI
        );
        assert_eq!(
            "Ollama".parse::<EmbeddingProvider>().unwrap(),
            EmbeddingProvider::Ollama
        );
        assert_eq!(
            "qdrant".parse::<IndexBackend>().unwrap(),
            IndexBackend::Qdrant
        );
        assert!("invalid".parse::<IndexBackend>().is_err());
    }

    #[test]
    fn test_validate_requires_keys() {
        let config = AppConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired(_))
        ));

        let mut config = AppConfig::default();
        config.embedding.openai_api_key = Some("sk-test".to_string());
        config.index.backend = IndexBackend::Memory;
        assert!(config.validate().is_ok());

        config.index.backend = IndexBackend::Pinecone;
        config.index.pinecone_api_key = Some("pc-test".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired(key)) if key == "PINECONE_HOST"
        ));
    }

    #[test]
    fn test_toml_partial_sections() {
        let config: AppConfig = toml::from_str(
            r#"
            [index]
            backend = "memory"
            dimension = 8

            [rag]
            answer_mode = "synthesize"
            "#,
        )
        .unwrap();

        assert_eq!(config.index.backend, IndexBackend::Memory);
        assert_eq!(config.index.dimension, 8);
        assert_eq!(config.index.name, "kbase");
        assert_eq!(config.rag.answer_mode, AnswerMode::Synthesize);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_embedding_dimension_override() {
        let config: AppConfig = toml::from_str(
            r#"
            [embedding]
            provider = "ollama"
            model = "bge-m3"
            dimension = 1024
            "#,
        )
        .unwrap();

        assert_eq!(config.embedding.dimension, Some(1024));
        assert_eq!(AppConfig::default().embedding.dimension, None);
    }
}
