//! Corpus store abstraction.
//!
//! The retrieval core reads the pre-embedded corpus through [`CorpusStore`].
//! Stores are read-only from the core's point of view; ingestion appends
//! rows through backend-specific paths.
//!
//! A store handle is one logical connection. Handles are checked out of a
//! connection pool for the duration of a request, so methods take
//! `&mut self` and implementations need not be `Sync`.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`nearest_neighbors`](CorpusStore::nearest_neighbors) | Cosine-similarity search over chunk embeddings |
//! | [`keyword_search`](CorpusStore::keyword_search) | Term search used when no query vector is available |
//! | [`exact_match`](CorpusStore::exact_match) | Fetch the chunk for one `(source, page)` |

pub mod memory;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{DocStatus, DocType, DocumentChunk};
use crate::scorer::Candidate;

/// Restricts which chunks a search may return.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreFilter {
    /// Allowed doc types; `None` allows every type.
    pub doc_types: Option<Vec<DocType>>,
    pub exclude_expired: bool,
}

impl StoreFilter {
    /// Whether `chunk` passes the filter.
    pub fn admits(&self, chunk: &DocumentChunk) -> bool {
        if self.exclude_expired && chunk.status == DocStatus::Expired {
            return false;
        }
        match &self.doc_types {
            Some(types) => types.contains(&chunk.doc_type),
            None => true,
        }
    }
}

/// Read access to the embedded corpus.
#[async_trait]
pub trait CorpusStore: Send {
    /// Up to `limit` chunks most similar to `vector`, most similar first.
    ///
    /// Fails with [`StoreError::DimensionMismatch`] when `vector` does not
    /// match the corpus dimensionality.
    async fn nearest_neighbors(
        &mut self,
        vector: &[f32],
        filter: &StoreFilter,
        limit: usize,
    ) -> Result<Vec<Candidate>, StoreError>;

    /// Up to `limit` chunks containing any of `terms`. The candidate
    /// similarity is the fraction of terms matched.
    async fn keyword_search(
        &mut self,
        terms: &[String],
        filter: &StoreFilter,
        limit: usize,
    ) -> Result<Vec<Candidate>, StoreError>;

    /// The chunk stored for `(source, page)`, if any.
    async fn exact_match(
        &mut self,
        source: &str,
        page: u32,
    ) -> Result<Option<DocumentChunk>, StoreError>;
}
