//! In-memory [`CorpusStore`] for tests and small embedded corpora.
//!
//! Chunks live in a `Vec` behind `Arc<std::sync::RwLock>`; cloning an
//! [`InMemoryCorpus`] yields another handle onto the same data, which is how
//! a connection pool hands out several "connections". Vector search is
//! brute-force cosine similarity over every embedded chunk.

use std::cmp::Ordering;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::StoreError;
use crate::lexicon::{contains_term, normalize};
use crate::models::DocumentChunk;
use crate::scorer::Candidate;

use super::{CorpusStore, StoreFilter};

/// Shared in-memory corpus handle.
#[derive(Clone, Default)]
pub struct InMemoryCorpus {
    chunks: Arc<RwLock<Vec<DocumentChunk>>>,
}

impl InMemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunks(chunks: Vec<DocumentChunk>) -> Self {
        Self {
            chunks: Arc::new(RwLock::new(chunks)),
        }
    }

    /// Append a chunk, rejecting embeddings whose dimension differs from
    /// the corpus.
    pub fn insert(&self, chunk: DocumentChunk) -> Result<(), StoreError> {
        let mut chunks = self.chunks.write().map_err(poisoned)?;
        if let Some(expected) = dims_of(&chunks) {
            if !chunk.embedding.is_empty() && chunk.embedding.len() != expected {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: chunk.embedding.len(),
                });
            }
        }
        chunks.push(chunk);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.chunks.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Embedding dimension of the corpus, if any chunk is embedded.
    pub fn dims(&self) -> Option<usize> {
        self.chunks.read().ok().and_then(|c| dims_of(&c))
    }
}

fn dims_of(chunks: &[DocumentChunk]) -> Option<usize> {
    chunks
        .iter()
        .find(|c| !c.embedding.is_empty())
        .map(|c| c.embedding.len())
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::fatal("in-memory corpus lock poisoned")
}

/// Most similar first; `(source, page)` keeps equal similarities stable.
fn by_similarity(a: &Candidate, b: &Candidate) -> Ordering {
    b.similarity
        .total_cmp(&a.similarity)
        .then_with(|| a.chunk.source.cmp(&b.chunk.source))
        .then(a.chunk.page.cmp(&b.chunk.page))
}

#[async_trait]
impl CorpusStore for InMemoryCorpus {
    async fn nearest_neighbors(
        &mut self,
        vector: &[f32],
        filter: &StoreFilter,
        limit: usize,
    ) -> Result<Vec<Candidate>, StoreError> {
        let chunks = self.chunks.read().map_err(poisoned)?;
        if let Some(expected) = dims_of(&chunks) {
            if vector.len() != expected {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        let mut candidates: Vec<Candidate> = chunks
            .iter()
            .filter(|c| !c.embedding.is_empty() && filter.admits(c))
            .map(|c| Candidate {
                similarity: cosine_similarity(vector, &c.embedding) as f64,
                chunk: c.clone(),
            })
            .collect();
        candidates.sort_by(by_similarity);
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn keyword_search(
        &mut self,
        terms: &[String],
        filter: &StoreFilter,
        limit: usize,
    ) -> Result<Vec<Candidate>, StoreError> {
        let terms: Vec<String> = terms
            .iter()
            .map(|t| normalize(t))
            .filter(|t| !t.is_empty())
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let chunks = self.chunks.read().map_err(poisoned)?;
        let mut candidates: Vec<Candidate> = chunks
            .iter()
            .filter(|c| filter.admits(c))
            .filter_map(|c| {
                let text = normalize(&c.content);
                let hits = terms.iter().filter(|t| contains_term(&text, t)).count();
                (hits > 0).then(|| Candidate {
                    similarity: hits as f64 / terms.len() as f64,
                    chunk: c.clone(),
                })
            })
            .collect();
        candidates.sort_by(by_similarity);
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn exact_match(
        &mut self,
        source: &str,
        page: u32,
    ) -> Result<Option<DocumentChunk>, StoreError> {
        let chunks = self.chunks.read().map_err(poisoned)?;
        Ok(chunks
            .iter()
            .find(|c| c.source == source && c.page == page)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocType;

    fn embedded(source: &str, page: u32, content: &str, v: Vec<f32>) -> DocumentChunk {
        let mut c = DocumentChunk::new(source, page, content);
        c.embedding = v;
        c
    }

    fn corpus() -> InMemoryCorpus {
        InMemoryCorpus::with_chunks(vec![
            embedded("E2/AS1", 90, "apron flashing cover", vec![1.0, 0.0]),
            embedded("B1/AS1", 3, "bracing units", vec![0.0, 1.0]),
            embedded("G12/AS1", 7, "hot water valve", vec![0.7, 0.7]),
        ])
    }

    #[tokio::test]
    async fn test_nearest_neighbors_ordering() {
        let mut store = corpus();
        let out = store
            .nearest_neighbors(&[1.0, 0.1], &StoreFilter::default(), 2)
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].chunk.source, "E2/AS1");
        assert_eq!(out[1].chunk.source, "G12/AS1");
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let mut store = corpus();
        let err = store
            .nearest_neighbors(&[1.0, 0.0, 0.0], &StoreFilter::default(), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { expected: 2, actual: 3 }));
        assert!(store
            .insert(embedded("X", 1, "", vec![1.0]))
            .is_err());
    }

    #[tokio::test]
    async fn test_filter_applies() {
        let mut store = corpus();
        let filter = StoreFilter {
            doc_types: Some(vec![DocType::AcceptableSolutionCurrent]),
            exclude_expired: false,
        };
        let out = store.nearest_neighbors(&[1.0, 0.0], &filter, 5).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_keyword_search() {
        let mut store = corpus();
        let out = store
            .keyword_search(&["flashing".into(), "cover".into()], &StoreFilter::default(), 5)
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].similarity, 1.0);
        assert!(store
            .keyword_search(&[], &StoreFilter::default(), 5)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_exact_match_and_shared_handles() {
        let store = corpus();
        let mut other = store.clone();
        store.insert(embedded("E3/AS1", 2, "shower", vec![0.5, 0.5])).unwrap();
        assert!(other.exact_match("E3/AS1", 2).await.unwrap().is_some());
        assert!(other.exact_match("E3/AS1", 3).await.unwrap().is_none());
        assert_eq!(store.len(), 4);
    }
}
