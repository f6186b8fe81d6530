//! Candidate deduplication.
//!
//! The vector and keyword legs of a search can both return the same page,
//! and overlapping chunk windows can map several chunks to one page. Only
//! the best-scoring candidate per `(source, page)` survives.

use std::collections::HashMap;

use crate::scorer::ScoredChunk;

/// Keep the highest-scoring candidate per `(source, page)`.
///
/// Survivors keep the position of the first candidate seen for their key.
/// On equal scores the earlier candidate wins.
pub fn dedup(candidates: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
    let mut slots: Vec<ScoredChunk> = Vec::with_capacity(candidates.len());
    let mut index: HashMap<(String, u32), usize> = HashMap::new();

    for candidate in candidates {
        let key = (candidate.chunk.source.clone(), candidate.chunk.page);
        match index.get(&key) {
            Some(&i) => {
                if candidate.score > slots[i].score {
                    slots[i] = candidate;
                }
            }
            None => {
                index.insert(key, slots.len());
                slots.push(candidate);
            }
        }
    }

    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentChunk, ScoreBreakdown};

    fn scored(source: &str, page: u32, score: f64, content: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: DocumentChunk::new(source, page, content),
            family: None,
            score,
            breakdown: ScoreBreakdown {
                vector_similarity: score,
                keyword_boost: 0.0,
                source_bias: 0.0,
                vector_weight: 1.0,
                keyword_weight: 0.0,
                source_bias_weight: 0.0,
                amendment_match: false,
            },
        }
    }

    #[test]
    fn test_keeps_highest_score_per_page() {
        let out = dedup(vec![
            scored("E2/AS1", 90, 0.7, "a"),
            scored("E2/AS1", 91, 0.6, "b"),
            scored("E2/AS1", 90, 0.9, "c"),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].chunk.content, "c");
        assert_eq!(out[1].chunk.page, 91);
    }

    #[test]
    fn test_tie_keeps_first() {
        let out = dedup(vec![scored("A", 1, 0.5, "first"), scored("A", 1, 0.5, "second")]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].chunk.content, "first");
    }

    #[test]
    fn test_same_page_different_source_kept() {
        let out = dedup(vec![scored("A", 1, 0.5, ""), scored("B", 1, 0.4, "")]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_empty() {
        assert!(dedup(Vec::new()).is_empty());
    }
}
