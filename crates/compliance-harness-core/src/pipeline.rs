//! The pure ranking pipeline.
//!
//! Given store candidates for a classified question, [`Ranker::rank`] runs
//! the fixed stage order:
//!
//! ```text
//! score → dedup → resolve hierarchy → truncate to k → locate citations
//! ```
//!
//! No I/O happens here. Fetching candidates, caching, timeouts and pooling
//! belong to the service layer in the app crate.

use tracing::debug;

use crate::citation::cite;
use crate::dedup::dedup;
use crate::hierarchy::resolve;
use crate::lexicon::normalize;
use crate::models::{Citation, Degradation, QueryIntent, RankedChunk};
use crate::scorer::{Candidate, HybridScorer, ScoredChunk};

/// Words too common to be useful as keyword-search terms.
const STOP_WORDS: &[&str] = &[
    "what", "when", "where", "which", "does", "have", "need", "with", "this", "that", "there",
    "from", "into", "about", "should", "would", "could", "much", "many", "your", "their",
];

/// Per-request ranking inputs.
#[derive(Debug, Clone)]
pub struct RankRequest<'a> {
    pub question: &'a str,
    pub intent: &'a QueryIntent,
    /// Maximum results after truncation.
    pub k: usize,
    /// No query vector was available.
    pub keyword_only: bool,
    /// Attach a score breakdown to every result.
    pub explain: bool,
}

/// Output of one ranking pass.
#[derive(Debug, Clone, Default)]
pub struct Ranked {
    pub results: Vec<RankedChunk>,
    pub citations: Vec<Citation>,
    pub degraded: Vec<Degradation>,
}

/// Scores, deduplicates, resolves, truncates and cites.
#[derive(Debug, Clone, Default)]
pub struct Ranker {
    scorer: HybridScorer,
    always_resolve_hierarchy: bool,
}

impl Ranker {
    pub fn new(scorer: HybridScorer) -> Self {
        Self {
            scorer,
            always_resolve_hierarchy: false,
        }
    }

    /// Resolve the source hierarchy for every intent, not only the
    /// compliance ones.
    pub fn always_resolve_hierarchy(mut self, on: bool) -> Self {
        self.always_resolve_hierarchy = on;
        self
    }

    pub fn scorer(&self) -> &HybridScorer {
        &self.scorer
    }

    pub fn rank(&self, request: &RankRequest<'_>, candidates: Vec<Candidate>) -> Ranked {
        let fetched = candidates.len();
        let query = self.scorer.query(
            request.question,
            request.intent.keyword_boost,
            request.keyword_only,
        );

        let scored = self.scorer.score_all(&query, candidates);
        let deduped = dedup(scored);
        let after_dedup = deduped.len();

        let resolved = if self.always_resolve_hierarchy
            || request.intent.category.requires_single_authority()
        {
            resolve(deduped, query.amendment.as_ref())
        } else {
            deduped
        };
        let after_hierarchy = resolved.len();

        let mut kept = resolved;
        kept.truncate(request.k);

        let (citations, degraded) = cite(
            kept.iter().map(|s| &s.chunk),
            request.intent.citation_limit(),
        );

        debug!(
            fetched,
            after_dedup,
            after_hierarchy,
            returned = kept.len(),
            citations = citations.len(),
            amendment = query.amendment.as_ref().map(|a| a.label()),
            "ranked candidates"
        );

        Ranked {
            results: kept
                .into_iter()
                .map(|s| to_ranked(s, request.explain))
                .collect(),
            citations,
            degraded,
        }
    }
}

fn to_ranked(scored: ScoredChunk, explain: bool) -> RankedChunk {
    let snippet = scored.chunk.display_snippet();
    RankedChunk {
        source: scored.chunk.source,
        page: scored.chunk.page,
        content: scored.chunk.content,
        snippet,
        final_score: scored.score,
        doc_type: scored.chunk.doc_type,
        priority: scored.chunk.priority,
        section: scored.chunk.section,
        explain: explain.then_some(scored.breakdown),
    }
}

/// Terms for the keyword-only search path.
///
/// Domain terms recognised by the classifier come first; without any, the
/// question's longer non-stop words are used.
pub fn keyword_terms(question: &str, intent: &QueryIntent) -> Vec<String> {
    if !intent.retrieval_bias_terms.is_empty() {
        return intent.retrieval_bias_terms.clone();
    }
    let mut terms: Vec<String> = Vec::new();
    for word in normalize(question).split(|c: char| !c.is_alphanumeric() && c != '-') {
        if word.len() >= 4 && !STOP_WORDS.contains(&word) && !terms.iter().any(|t| t == word) {
            terms.push(word.to_string());
        }
    }
    terms
}
