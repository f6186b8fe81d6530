//! The retrieval service: one long-lived value owning the cache, the pool
//! and the ranking pipeline.
//!
//! # Request Flow
//!
//! ```text
//! query ──► cache ──hit──► response (cache_hit = true)
//!             │
//!            miss
//!             ▼
//!          classify ──► embed ──fail──► keyword_search (keyword_only)
//!                         │
//!                         ▼
//!                acquire ─► nearest_neighbors ─transient─► backoff, retry once
//!                         │                                     │
//!                         ▼                                   fail
//!                  Ranker::rank                                 ▼
//!                         │                       empty (retrieval_unavailable)
//!                         ▼
//!                 cache (unless an outage tag) ──► response
//! ```
//!
//! Everything after the cache lookup runs under `retrieval.request_timeout_ms`.
//! When it fires the request returns an empty response tagged `timeout`.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use compliance_harness_core::classifier::IntentClassifier;
use compliance_harness_core::embedding::EmbeddingProvider;
use compliance_harness_core::error::{ConfigError, RetrievalError, StoreError};
use compliance_harness_core::models::{Degradation, IntentCategory, QueryIntent, RetrievalResponse};
use compliance_harness_core::pipeline::{keyword_terms, RankRequest, Ranker};
use compliance_harness_core::scorer::Candidate;
use compliance_harness_core::store::{CorpusStore, StoreFilter};

use crate::cache::{cache_key, ResultCache};
use crate::config::Config;
use crate::pool::{ConnectionManager, ConnectionPool, PoolStats};

/// Per-call knobs for [`RetrievalService::retrieve_with`].
#[derive(Debug, Clone, Default)]
pub struct RetrieveOptions {
    /// Number of results wanted. `0` uses the intent's `top_k`.
    pub k: usize,
    /// Skip classification and use this category.
    pub intent: Option<IntentCategory>,
    /// Attach score breakdowns.
    pub explain: bool,
}

/// How the candidate set was obtained.
enum Fetch {
    Vector(Vec<f32>),
    Keyword(Vec<String>),
}

pub struct RetrievalService<M: ConnectionManager> {
    config: Config,
    classifier: IntentClassifier,
    ranker: Ranker,
    cache: ResultCache,
    pool: Arc<ConnectionPool<M>>,
    embedder: Arc<dyn EmbeddingProvider>,
    filter: StoreFilter,
}

impl<M: ConnectionManager> RetrievalService<M> {
    /// Build a service. Fails on invalid configuration.
    pub fn new(
        config: Config,
        manager: M,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let ranker = config.build_ranker()?;
        Ok(Self {
            classifier: config.build_classifier(),
            cache: ResultCache::new(&config.cache),
            pool: ConnectionPool::new(manager, &config.pool),
            filter: config.store_filter(),
            ranker,
            embedder,
            config,
        })
    }

    /// Pre-open the pool's minimum connections.
    pub async fn init(&self) -> Result<(), RetrievalError> {
        self.pool.init().await?;
        info!(
            embedder = self.embedder.model_name(),
            pool_max = self.config.pool.max,
            "retrieval service ready"
        );
        Ok(())
    }

    /// Close the pool and drop cached results.
    pub fn shutdown(&self) {
        self.pool.shutdown();
        self.cache.clear();
        info!("retrieval service shut down");
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pool(&self) -> &Arc<ConnectionPool<M>> {
        &self.pool
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn cached_entries(&self) -> u64 {
        self.cache.len()
    }

    pub fn classify(&self, query: &str) -> QueryIntent {
        self.classifier.classify(query, None)
    }

    /// Retrieve ranked passages and citations for a question.
    pub async fn retrieve(
        &self,
        query: &str,
        requested_k: usize,
        intent_override: Option<IntentCategory>,
    ) -> Result<RetrievalResponse, RetrievalError> {
        let options = RetrieveOptions {
            k: requested_k,
            intent: intent_override,
            explain: false,
        };
        self.retrieve_with(query, &options).await
    }

    pub async fn retrieve_with(
        &self,
        query: &str,
        options: &RetrieveOptions,
    ) -> Result<RetrievalResponse, RetrievalError> {
        if query.trim().is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }

        let key = cache_key(query, options.k, options.intent, options.explain);
        if let Some(mut cached) = self.cache.get(&key) {
            debug!(key = %&key[..12], "cache hit");
            cached.cache_hit = true;
            return Ok(cached);
        }
        debug!(key = %&key[..12], "cache miss");

        let intent = match options.intent {
            Some(category) => self.classifier.resolve(query, category),
            None => self.classifier.classify(query, None),
        };
        let k = self.effective_k(options.k, &intent);
        debug!(
            intent = intent.category.as_str(),
            confidence = intent.confidence,
            rule = %intent.rule,
            k,
            "intent classified"
        );

        let timeout = Duration::from_millis(self.config.retrieval.request_timeout_ms);
        let started = Instant::now();
        let outcome =
            tokio::time::timeout(timeout, self.run(query, &intent, k, options.explain)).await;
        let response = match outcome {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    after_ms = self.config.retrieval.request_timeout_ms,
                    "retrieval timed out"
                );
                empty_response(
                    intent,
                    Degradation::Timeout {
                        after_ms: self.config.retrieval.request_timeout_ms,
                    },
                )
            }
        };

        info!(
            results = response.results.len(),
            citations = response.citations.len(),
            degraded = ?response.degraded.iter().map(|d| d.label()).collect::<Vec<_>>(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "retrieve"
        );

        self.cache.insert(key, &response);
        Ok(response)
    }

    fn effective_k(&self, requested: usize, intent: &QueryIntent) -> usize {
        let k = if requested == 0 { intent.top_k } else { requested };
        k.min(self.config.retrieval.max_k)
    }

    async fn run(
        &self,
        query: &str,
        intent: &QueryIntent,
        k: usize,
        explain: bool,
    ) -> Result<RetrievalResponse, RetrievalError> {
        let mut degraded = Vec::new();

        let fetch = match self.embedder.embed(query).await {
            Ok(vector) => Fetch::Vector(vector),
            Err(e) if self.config.retrieval.keyword_fallback => {
                warn!(error = %e, "embedding unavailable, ranking keyword-only");
                degraded.push(Degradation::KeywordOnly {
                    reason: e.to_string(),
                });
                Fetch::Keyword(keyword_terms(query, intent))
            }
            Err(e) => return Err(RetrievalError::EmbeddingUnavailable(e)),
        };
        let keyword_only = matches!(fetch, Fetch::Keyword(_));

        let candidates = match self.fetch_with_retry(&fetch).await? {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "corpus store unavailable after retry");
                let mut response = empty_response(
                    intent.clone(),
                    Degradation::RetrievalUnavailable {
                        reason: e.to_string(),
                    },
                );
                degraded.append(&mut response.degraded);
                response.degraded = degraded;
                return Ok(response);
            }
        };
        debug!(fetched = candidates.len(), keyword_only, "candidates fetched");

        let request = RankRequest {
            question: query,
            intent,
            k,
            keyword_only,
            explain,
        };
        let ranked = self.ranker.rank(&request, candidates);
        degraded.extend(ranked.degraded);

        Ok(RetrievalResponse {
            results: ranked.results,
            citations: ranked.citations,
            cache_hit: false,
            intent: intent.clone(),
            degraded,
        })
    }

    /// Fetch candidates, retrying a transient store failure once.
    ///
    /// The outer `Result` carries errors the caller must surface; the inner
    /// one carries a transient failure that persisted through the retry.
    async fn fetch_with_retry(
        &self,
        fetch: &Fetch,
    ) -> Result<Result<Vec<Candidate>, StoreError>, RetrievalError> {
        match self.fetch_once(fetch).await? {
            Ok(candidates) => return Ok(Ok(candidates)),
            Err(e) => {
                let backoff = Duration::from_millis(self.config.retrieval.retry_backoff_ms);
                warn!(error = %e, backoff_ms = backoff.as_millis() as u64, "transient store error, retrying");
                tokio::time::sleep(backoff).await;
            }
        }
        self.fetch_once(fetch).await
    }

    async fn fetch_once(
        &self,
        fetch: &Fetch,
    ) -> Result<Result<Vec<Candidate>, StoreError>, RetrievalError> {
        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            // Opening a fresh connection failed; retried like a failed query.
            Err(RetrievalError::Store(e)) if e.is_transient() => return Ok(Err(e)),
            Err(e) => return Err(e),
        };
        let limit = self.config.retrieval.candidate_k;
        let result = match fetch {
            Fetch::Vector(vector) => conn.nearest_neighbors(vector, &self.filter, limit).await,
            Fetch::Keyword(terms) => conn.keyword_search(terms, &self.filter, limit).await,
        };
        match result {
            Ok(candidates) => Ok(Ok(candidates)),
            Err(e) if e.is_transient() => {
                conn.discard();
                Ok(Err(e))
            }
            Err(e) => Err(RetrievalError::Store(e)),
        }
    }
}

fn empty_response(intent: QueryIntent, degradation: Degradation) -> RetrievalResponse {
    RetrievalResponse {
        results: Vec::new(),
        citations: Vec::new(),
        cache_hit: false,
        intent,
        degraded: vec![degradation],
    }
}
