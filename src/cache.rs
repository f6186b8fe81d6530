//! Read-through result cache.
//!
//! Keys are SHA-256 hex digests of the normalized question plus the
//! request parameters that change the answer (requested k, intent
//! override, explain). Entries expire after the configured TTL; when the
//! cache is full moka's TinyLFU policy evicts by size.

use moka::sync::Cache;
use sha2::{Digest, Sha256};
use std::time::Duration;

use compliance_harness_core::models::{IntentCategory, RetrievalResponse};

use crate::config::CacheConfig;

/// Lowercase, collapse whitespace, trim, and strip trailing `?`, `!`, `.`.
pub fn normalize_query(query: &str) -> String {
    let collapsed = query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    collapsed
        .trim_end_matches(['?', '!', '.'])
        .trim_end()
        .to_string()
}

/// Cache key for one request shape.
pub fn cache_key(
    query: &str,
    requested_k: usize,
    intent_override: Option<IntentCategory>,
    explain: bool,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_query(query).as_bytes());
    hasher.update(b"\x00k=");
    hasher.update(requested_k.to_string().as_bytes());
    hasher.update(b"\x00intent=");
    hasher.update(intent_override.map(|c| c.as_str()).unwrap_or("-").as_bytes());
    hasher.update(b"\x00explain=");
    hasher.update(if explain { b"1" } else { b"0" });
    hex::encode(hasher.finalize())
}

pub struct ResultCache {
    cache: Cache<String, RetrievalResponse>,
}

impl ResultCache {
    pub fn new(config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.capacity)
            .time_to_live(Duration::from_secs(config.ttl_secs))
            .build();
        Self { cache }
    }

    pub fn get(&self, key: &str) -> Option<RetrievalResponse> {
        self.cache.get(key)
    }

    /// Store a response. Responses degraded by an outage (keyword-only,
    /// store unavailable, timeout) are not cached.
    pub fn insert(&self, key: String, response: &RetrievalResponse) {
        if response.has_transient_degradation() {
            return;
        }
        let mut stored = response.clone();
        stored.cache_hit = false;
        self.cache.insert(key, stored);
    }

    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}
