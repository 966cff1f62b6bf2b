//! Stub providers for tests
//!
//! Each stub counts its calls and can be switched into a failing mode, so
//! tests can assert which provider calls a request did or did not make.

use async_trait::async_trait;
use kbase_core::{KbError, LlmClient, Match, Result};
use kbase_vector::{EmbeddingClient, InMemoryStore, StoredEntry, VectorStore};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Embedding stub: identical text always yields an identical vector
#[derive(Debug)]
pub struct StubEmbedding {
    dimension: usize,
    constant: Option<Vec<f32>>,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl StubEmbedding {
    /// Hash words of the text into a vector of `dimension`
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            constant: None,
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Return the same vector for every text; declares no dimension, like
    /// a model missing from the built-in tables
    pub fn constant(vector: Vec<f32>) -> Self {
        Self {
            dimension: vector.len(),
            constant: Some(vector),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Make every following call fail
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of `embed` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hash_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for word in text.split_whitespace() {
            // FNV-1a
            let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
            for byte in word.to_lowercase().bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x0100_0000_01b3);
            }
            vector[(hash % self.dimension as u64) as usize] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingClient for StubEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(KbError::Embedding("stub embedding failure".to_string()));
        }
        Ok(self
            .constant
            .clone()
            .unwrap_or_else(|| self.hash_text(text)))
    }

    fn dimension(&self) -> Option<usize> {
        self.constant.is_none().then_some(self.dimension)
    }
}

/// Vector store stub: in-memory store with call counters
#[derive(Debug)]
pub struct RecordingStore {
    inner: InMemoryStore,
    canned: Mutex<Option<Vec<Match>>>,
    fail: AtomicBool,
    upserts: Mutex<Vec<StoredEntry>>,
    searches: AtomicUsize,
}

impl RecordingStore {
    /// Create an empty store
    pub fn new(dimension: usize) -> Self {
        Self {
            inner: InMemoryStore::new(dimension),
            canned: Mutex::new(None),
            fail: AtomicBool::new(false),
            upserts: Mutex::new(Vec::new()),
            searches: AtomicUsize::new(0),
        }
    }

    /// Answer every search with these matches instead of the stored entries
    pub fn with_matches(self, matches: Vec<Match>) -> Self {
        if let Ok(mut canned) = self.canned.lock() {
            *canned = Some(matches);
        }
        self
    }

    /// Make every following call fail
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Entries passed to `upsert`, in call order
    pub fn upserts(&self) -> Vec<StoredEntry> {
        self.upserts
            .lock()
            .map(|u| u.clone())
            .unwrap_or_default()
    }

    /// Number of `upsert` calls so far
    pub fn upsert_calls(&self) -> usize {
        self.upserts.lock().map(|u| u.len()).unwrap_or_default()
    }

    /// Number of `search` calls so far
    pub fn search_calls(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorStore for RecordingStore {
    async fn ensure_index(&self) -> Result<()> {
        self.inner.ensure_index().await
    }

    async fn upsert(&self, entry: &StoredEntry) -> Result<()> {
        if let Ok(mut upserts) = self.upserts.lock() {
            upserts.push(entry.clone());
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(KbError::Index("stub index failure".to_string()));
        }
        self.inner.upsert(entry).await
    }

    async fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<Match>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(KbError::Index("stub index failure".to_string()));
        }
        let canned = self.canned.lock().ok().and_then(|c| c.clone());
        match canned {
            Some(mut matches) => {
                matches.truncate(top_k);
                Ok(matches)
            }
            None => self.inner.search(query_vector, top_k).await,
        }
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Completion stub: fixed answer, records prompts
#[derive(Debug)]
pub struct StubLlm {
    answer: String,
    fail: AtomicBool,
    prompts: Mutex<Vec<String>>,
}

impl StubLlm {
    /// Always answer with `answer`
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            fail: AtomicBool::new(false),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Make every following call fail
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    /// Number of `generate` calls so far
    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for StubLlm {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(KbError::Completion("stub completion failure".to_string()));
        }
        Ok(self.answer.clone())
    }

    fn name(&self) -> &str {
        "stub"
    }
}
