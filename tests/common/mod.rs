//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use compliance_harness::config::Config;
use compliance_harness::pool::ConnectionManager;
use compliance_harness::service::RetrievalService;
use compliance_harness_core::embedding::EmbeddingProvider;
use compliance_harness_core::error::{EmbeddingError, StoreError};
use compliance_harness_core::models::{DocType, DocumentChunk, DocStatus};
use compliance_harness_core::scorer::Candidate;
use compliance_harness_core::store::memory::InMemoryCorpus;
use compliance_harness_core::store::{CorpusStore, StoreFilter};

pub const HASH_DIMS: usize = 32;

/// Bag-of-words embedder: each lowercase word is hashed (FNV-1a) into one of
/// [`HASH_DIMS`] buckets, then the vector is L2-normalized.
pub struct HashEmbedder;

pub fn hash_embed(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; HASH_DIMS];
    for word in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in word.bytes() {
            h ^= b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        v[(h % HASH_DIMS as u64) as usize] += 1.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }

    fn dims(&self) -> usize {
        HASH_DIMS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(hash_embed(text))
    }
}

/// Returns the same vector for every query. Pair with [`at_similarity`]
/// to pin each chunk's cosine similarity.
pub struct FixedEmbedder(pub Vec<f32>);

impl FixedEmbedder {
    pub fn unit() -> Self {
        FixedEmbedder(vec![1.0, 0.0])
    }
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    fn model_name(&self) -> &str {
        "fixed"
    }

    fn dims(&self) -> usize {
        self.0.len()
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.0.clone())
    }
}

/// Always unavailable, as if the provider were down.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }

    fn dims(&self) -> usize {
        2
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Unavailable {
            reason: "connection refused".into(),
        })
    }
}

/// Two-dimensional embedding whose cosine with `[1, 0]` is `similarity`.
pub fn at_similarity(similarity: f32) -> Vec<f32> {
    vec![similarity, (1.0 - similarity * similarity).max(0.0).sqrt()]
}

pub fn chunk(
    source: &str,
    page: u32,
    doc_type: DocType,
    priority: i32,
    content: &str,
    similarity: f32,
) -> DocumentChunk {
    let mut c = DocumentChunk::new(source, page, content);
    c.doc_type = doc_type;
    c.status = match doc_type {
        DocType::AcceptableSolutionLegacy | DocType::VerificationMethodLegacy => DocStatus::Legacy,
        _ => DocStatus::Current,
    };
    c.priority = priority;
    c.embedding = at_similarity(similarity);
    c
}

/// Behaviour knobs shared by every connection a [`ScriptedManager`] opens.
#[derive(Default)]
pub struct Script {
    /// Store calls made so far (any method).
    pub calls: AtomicUsize,
    /// Remaining calls that fail with a transient error.
    pub transient_failures: AtomicUsize,
    /// Every call fails with a fatal error.
    pub fatal: bool,
    /// Added latency per call.
    pub delay: Duration,
    /// Connections opened so far.
    pub connects: AtomicUsize,
    /// Remaining connection attempts that fail with a transient error.
    pub connect_failures: AtomicUsize,
}

impl Script {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn open(&self) -> Result<(), StoreError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .connect_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StoreError::transient("unable to open database file"));
        }
        Ok(())
    }

    async fn enter(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fatal {
            return Err(StoreError::fatal("no such table: chunks"));
        }
        let failed = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StoreError::transient("database is locked"));
        }
        Ok(())
    }
}

/// An [`InMemoryCorpus`] handle that follows a [`Script`].
pub struct ScriptedStore {
    inner: InMemoryCorpus,
    script: Arc<Script>,
}

#[async_trait]
impl CorpusStore for ScriptedStore {
    async fn nearest_neighbors(
        &mut self,
        vector: &[f32],
        filter: &StoreFilter,
        limit: usize,
    ) -> Result<Vec<Candidate>, StoreError> {
        self.script.enter().await?;
        self.inner.nearest_neighbors(vector, filter, limit).await
    }

    async fn keyword_search(
        &mut self,
        terms: &[String],
        filter: &StoreFilter,
        limit: usize,
    ) -> Result<Vec<Candidate>, StoreError> {
        self.script.enter().await?;
        self.inner.keyword_search(terms, filter, limit).await
    }

    async fn exact_match(
        &mut self,
        source: &str,
        page: u32,
    ) -> Result<Option<DocumentChunk>, StoreError> {
        self.script.enter().await?;
        self.inner.exact_match(source, page).await
    }
}

pub struct ScriptedManager {
    corpus: InMemoryCorpus,
    script: Arc<Script>,
}

impl ScriptedManager {
    pub fn new(chunks: Vec<DocumentChunk>, script: Arc<Script>) -> Self {
        Self {
            corpus: InMemoryCorpus::with_chunks(chunks),
            script,
        }
    }
}

#[async_trait]
impl ConnectionManager for ScriptedManager {
    type Connection = ScriptedStore;

    async fn connect(&self) -> Result<Self::Connection, StoreError> {
        self.script.open()?;
        Ok(ScriptedStore {
            inner: self.corpus.clone(),
            script: Arc::clone(&self.script),
        })
    }
}

pub fn test_config() -> Config {
    let mut config = Config::with_db("unused.sqlite");
    config.retrieval.retry_backoff_ms = 5;
    config
}

pub fn service(
    config: Config,
    chunks: Vec<DocumentChunk>,
    script: Arc<Script>,
    embedder: Arc<dyn EmbeddingProvider>,
) -> RetrievalService<ScriptedManager> {
    RetrievalService::new(config, ScriptedManager::new(chunks, script), embedder)
        .expect("valid test config")
}

/// The building-code fixture used by most scenarios.
pub fn roofing_corpus() -> Vec<DocumentChunk> {
    vec![
        chunk(
            "E2/AS1",
            90,
            DocType::AcceptableSolutionCurrent,
            90,
            "Clause 9.1.3 apron flashing cover shall be a minimum of 150 mm",
            0.80,
        ),
        chunk(
            "NZ Metal Roofing",
            40,
            DocType::IndustryCodeOfPractice,
            75,
            "apron flashing cover recommendations, see p.40",
            0.84,
        ),
        chunk(
            "E2/AS1 3rd edition",
            88,
            DocType::AcceptableSolutionLegacy,
            90,
            "apron flashing cover of 130 mm",
            0.82,
        ),
        chunk(
            "G12/AS1",
            14,
            DocType::AcceptableSolutionCurrent,
            90,
            "tempering valve outlet temperature",
            0.10,
        ),
    ]
}
