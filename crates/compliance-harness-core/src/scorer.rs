//! Hybrid scorer.
//!
//! Blends three signals into one score in `[0, 1]`:
//!
//! ```text
//! score = w_v · vector_similarity + w_k · keyword_boost + w_b · source_bias
//! ```
//!
//! - **vector_similarity**: cosine similarity reported by the corpus store,
//!   clamped to `[0, 1]`.
//! - **keyword_boost**: `min(hits, cap) / cap`, where hits are distinct terms
//!   of the chunk's family lexicon present in both question and passage.
//! - **source_bias**: static authority (doc type, priority, status, family
//!   weight) adjusted when the question names a specific amendment or
//!   edition: the named document is boosted and its same-family siblings are
//!   discounted by the same proportion.
//!
//! Ordering is total and deterministic: score desc, priority desc, page asc,
//! source asc.

use regex::Regex;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::error::ConfigError;
use crate::family::{CodeFamily, FamilyTable};
use crate::lexicon::{all_terms, contains_term, lexicon_for, normalize};
use crate::models::{DocType, DocumentChunk, ScoreBreakdown};

/// Tolerance when checking that weights sum to one.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Share of the static bias taken from the doc-type weight; the rest comes
/// from `priority / 100`.
const DOC_TYPE_SHARE: f64 = 0.7;

/// Default cap on distinct keyword hits.
pub const DEFAULT_KEYWORD_CAP: usize = 3;

/// Default proportional amendment boost/discount.
pub const DEFAULT_AMENDMENT_BOOST: f64 = 0.5;

/// Signal weights. Always non-negative and summing to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    pub vector: f64,
    pub keyword: f64,
    pub source_bias: f64,
}

impl ScoringWeights {
    /// Validated constructor. The weights must already sum to 1.
    pub fn new(vector: f64, keyword: f64, source_bias: f64) -> Result<Self, ConfigError> {
        for (name, w) in [
            ("retrieval.vector_weight", vector),
            ("retrieval.keyword_weight", keyword),
            ("retrieval.source_bias_weight", source_bias),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(ConfigError::new(name, format!("must be a finite value >= 0, got {}", w)));
            }
        }
        let sum = vector + keyword + source_bias;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::new(
                "retrieval",
                format!(
                    "vector_weight + keyword_weight + source_bias_weight must sum to 1.0, got {}",
                    sum
                ),
            ));
        }
        Ok(Self {
            vector,
            keyword,
            source_bias,
        })
    }

    /// Scale arbitrary non-negative weights so they sum to 1.
    pub fn normalized(vector: f64, keyword: f64, source_bias: f64) -> Result<Self, ConfigError> {
        let sum = vector + keyword + source_bias;
        if !sum.is_finite() || sum <= 0.0 {
            return Err(ConfigError::new("retrieval", "weights must have a positive sum"));
        }
        Self::new(vector / sum, keyword / sum, source_bias / sum)
    }

    /// Weights with the vector signal removed and the rest re-normalized.
    pub fn without_vector(&self) -> Self {
        let rest = self.keyword + self.source_bias;
        if rest <= 0.0 {
            return Self {
                vector: 0.0,
                keyword: 1.0,
                source_bias: 0.0,
            };
        }
        Self {
            vector: 0.0,
            keyword: self.keyword / rest,
            source_bias: self.source_bias / rest,
        }
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            vector: 0.6,
            keyword: 0.2,
            source_bias: 0.2,
        }
    }
}

/// Whether a named amendment or an edition was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmendmentKind {
    Amendment,
    Edition,
}

/// An amendment/edition named in a question.
#[derive(Debug, Clone)]
pub struct AmendmentRef {
    pub kind: AmendmentKind,
    pub number: u32,
    matcher: Option<Regex>,
}

impl AmendmentRef {
    fn new(kind: AmendmentKind, number: u32) -> Self {
        let pattern = match kind {
            AmendmentKind::Amendment => {
                format!(r"(?i)\b(?:amendment|amdt|amd)\.?\s*0*{}\b", number)
            }
            AmendmentKind::Edition => format!(
                r"(?i)\b(?:0*{n}(?:st|nd|rd|th)\s+edition|edition\s+0*{n})\b",
                n = number
            ),
        };
        let matcher = Regex::new(&pattern).ok();
        Self {
            kind,
            number,
            matcher,
        }
    }

    /// Human-readable label, e.g. `"amendment 13"`.
    pub fn label(&self) -> String {
        match self.kind {
            AmendmentKind::Amendment => format!("amendment {}", self.number),
            AmendmentKind::Edition => format!("edition {}", self.number),
        }
    }

    /// Whether a chunk's source name or version label names this amendment.
    pub fn matches(&self, chunk: &DocumentChunk) -> bool {
        let Some(matcher) = &self.matcher else {
            return false;
        };
        matcher.is_match(&chunk.source)
            || chunk
                .version_label
                .as_deref()
                .is_some_and(|v| matcher.is_match(v))
    }
}

/// Finds amendment/edition references in questions.
///
/// Every pattern must have one capture group holding the number. A match
/// whose text contains "edition" is an edition reference; anything else is
/// an amendment.
#[derive(Debug, Clone)]
pub struct AmendmentDetector {
    patterns: Vec<Regex>,
}

impl AmendmentDetector {
    pub fn default_patterns() -> Vec<String> {
        vec![
            r"(?i)\b(?:amendment|amdt|amd)\.?\s*(\d{1,3})\b".to_string(),
            r"(?i)\b(\d{1,2})(?:st|nd|rd|th)\s+edition\b".to_string(),
            r"(?i)\bedition\s+(\d{1,2})\b".to_string(),
        ]
    }

    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ConfigError> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for p in patterns {
            let re = Regex::new(p.as_ref()).map_err(|e| {
                ConfigError::new("retrieval.amendment_patterns", format!("{}: {}", p.as_ref(), e))
            })?;
            if re.captures_len() < 2 {
                return Err(ConfigError::new(
                    "retrieval.amendment_patterns",
                    format!("pattern '{}' needs a capture group for the number", p.as_ref()),
                ));
            }
            compiled.push(re);
        }
        Ok(Self { patterns: compiled })
    }

    /// First amendment/edition reference in `query`, trying patterns in order.
    pub fn detect(&self, query: &str) -> Option<AmendmentRef> {
        self.patterns.iter().find_map(|re| {
            let caps = re.captures(query)?;
            let number: u32 = caps.get(1)?.as_str().parse().ok()?;
            let whole = caps.get(0)?.as_str().to_ascii_lowercase();
            let kind = if whole.contains("edition") {
                AmendmentKind::Edition
            } else {
                AmendmentKind::Amendment
            };
            Some(AmendmentRef::new(kind, number))
        })
    }
}

impl Default for AmendmentDetector {
    fn default() -> Self {
        let patterns = Self::default_patterns()
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();
        Self { patterns }
    }
}

/// Static source-bias table.
#[derive(Debug, Clone, Default)]
pub struct SourceBiasTable {
    doc_type_weights: HashMap<DocType, f64>,
    family_weights: HashMap<String, f64>,
}

impl SourceBiasTable {
    /// Override the authority weight of a doc type.
    pub fn with_doc_type_weight(mut self, doc_type: DocType, weight: f64) -> Self {
        self.doc_type_weights.insert(doc_type, weight.clamp(0.0, 1.0));
        self
    }

    /// Scale the bias of every source in `family`.
    pub fn with_family_weight(mut self, family: &str, weight: f64) -> Self {
        self.family_weights
            .insert(family.to_string(), weight.max(0.0));
        self
    }

    pub fn doc_type_weight(&self, doc_type: DocType) -> f64 {
        self.doc_type_weights
            .get(&doc_type)
            .copied()
            .unwrap_or_else(|| doc_type.default_weight())
    }

    /// Static bias in `[0, 1]`.
    pub fn static_bias(&self, chunk: &DocumentChunk, family: Option<&CodeFamily>) -> f64 {
        let priority = (chunk.priority as f64 / 100.0).clamp(0.0, 1.0);
        let base = DOC_TYPE_SHARE * self.doc_type_weight(chunk.doc_type)
            + (1.0 - DOC_TYPE_SHARE) * priority;
        let family_factor = family
            .and_then(|f| self.family_weights.get(f.as_str()))
            .copied()
            .unwrap_or(1.0);
        (base * family_factor * chunk.status.bias_factor()).clamp(0.0, 1.0)
    }
}

/// A chunk returned by the corpus store with its similarity.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub chunk: DocumentChunk,
    pub similarity: f64,
}

/// Per-request scoring inputs.
#[derive(Debug, Clone)]
pub struct ScoringQuery {
    /// Normalized question text.
    pub text: String,
    pub amendment: Option<AmendmentRef>,
    pub keyword_boost: bool,
    /// Embeddings were unavailable; the vector weight is dropped.
    pub keyword_only: bool,
}

/// A scored candidate flowing through dedup, hierarchy, and truncation.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub family: Option<CodeFamily>,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

/// The hybrid scorer. Pure: holds only configuration.
#[derive(Debug, Clone)]
pub struct HybridScorer {
    weights: ScoringWeights,
    bias: SourceBiasTable,
    detector: AmendmentDetector,
    families: FamilyTable,
    keyword_cap: usize,
    amendment_boost: f64,
}

impl HybridScorer {
    pub fn new(
        weights: ScoringWeights,
        bias: SourceBiasTable,
        detector: AmendmentDetector,
        families: FamilyTable,
    ) -> Self {
        Self {
            weights,
            bias,
            detector,
            families,
            keyword_cap: DEFAULT_KEYWORD_CAP,
            amendment_boost: DEFAULT_AMENDMENT_BOOST,
        }
    }

    pub fn with_amendment_boost(mut self, boost: f64) -> Self {
        self.amendment_boost = boost.clamp(0.0, 0.99);
        self
    }

    pub fn with_keyword_cap(mut self, cap: usize) -> Self {
        self.keyword_cap = cap.max(1);
        self
    }

    pub fn weights(&self) -> ScoringWeights {
        self.weights
    }

    pub fn families(&self) -> &FamilyTable {
        &self.families
    }

    /// Build the per-request scoring inputs for a question.
    pub fn query(&self, question: &str, keyword_boost: bool, keyword_only: bool) -> ScoringQuery {
        ScoringQuery {
            text: normalize(question),
            amendment: self.detector.detect(question),
            keyword_boost,
            keyword_only,
        }
    }

    /// Score every candidate and return them in rank order.
    pub fn score_all(&self, query: &ScoringQuery, candidates: Vec<Candidate>) -> Vec<ScoredChunk> {
        let families: Vec<Option<CodeFamily>> = candidates
            .iter()
            .map(|c| self.families.family_of(&c.chunk.source))
            .collect();

        // Families in which the named amendment was found among the candidates.
        let targeted: HashSet<CodeFamily> = match &query.amendment {
            Some(amendment) => candidates
                .iter()
                .zip(&families)
                .filter(|(c, _)| amendment.matches(&c.chunk))
                .filter_map(|(_, f)| f.clone())
                .collect(),
            None => HashSet::new(),
        };

        let mut scored: Vec<ScoredChunk> = candidates
            .into_iter()
            .zip(families)
            .map(|(c, family)| self.score_one(query, c, family, &targeted))
            .collect();
        scored.sort_by(rank_order);
        scored
    }

    fn score_one(
        &self,
        query: &ScoringQuery,
        candidate: Candidate,
        family: Option<CodeFamily>,
        targeted: &HashSet<CodeFamily>,
    ) -> ScoredChunk {
        let weights = if query.keyword_only {
            self.weights.without_vector()
        } else {
            self.weights
        };

        let vector_similarity = if query.keyword_only {
            0.0
        } else if candidate.similarity.is_finite() {
            candidate.similarity.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let keyword = if query.keyword_boost {
            self.keyword_boost(&query.text, &candidate.chunk, family.as_ref())
        } else {
            0.0
        };

        let mut bias = self.bias.static_bias(&candidate.chunk, family.as_ref());
        let mut amendment_match = false;
        if let Some(amendment) = &query.amendment {
            if amendment.matches(&candidate.chunk) {
                amendment_match = true;
                bias = (bias * (1.0 + self.amendment_boost)).min(1.0);
            } else if family.as_ref().is_some_and(|f| targeted.contains(f)) {
                bias *= 1.0 - self.amendment_boost;
            }
        }

        let raw = weights.vector * vector_similarity
            + weights.keyword * keyword
            + weights.source_bias * bias;
        let score = if raw.is_finite() {
            raw.clamp(0.0, 1.0)
        } else {
            0.0
        };

        ScoredChunk {
            chunk: candidate.chunk,
            family,
            score,
            breakdown: ScoreBreakdown {
                vector_similarity,
                keyword_boost: keyword,
                source_bias: bias,
                vector_weight: weights.vector,
                keyword_weight: weights.keyword,
                source_bias_weight: weights.source_bias,
                amendment_match,
            },
        }
    }

    /// Distinct lexicon hits shared by question and passage, capped and
    /// scaled to `[0, 1]`. Zero hits gives zero.
    pub fn keyword_boost(
        &self,
        query_text: &str,
        chunk: &DocumentChunk,
        family: Option<&CodeFamily>,
    ) -> f64 {
        let generic;
        let lexicon: &[&str] = match family.and_then(|f| lexicon_for(f.as_str())) {
            Some(terms) => terms,
            None => {
                generic = all_terms();
                &generic
            }
        };

        let mut passage = normalize(&chunk.content);
        for extra in [&chunk.section, &chunk.clause].into_iter().flatten() {
            passage.push(' ');
            passage.push_str(&normalize(extra));
        }

        let hits = lexicon
            .iter()
            .filter(|t| contains_term(query_text, t) && contains_term(&passage, t))
            .count();
        hits.min(self.keyword_cap) as f64 / self.keyword_cap as f64
    }
}

impl Default for HybridScorer {
    fn default() -> Self {
        Self::new(
            ScoringWeights::default(),
            SourceBiasTable::default(),
            AmendmentDetector::default(),
            FamilyTable::default(),
        )
    }
}

/// Total rank order: score desc, priority desc, page asc, source asc.
pub fn rank_order(a: &ScoredChunk, b: &ScoredChunk) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then(b.chunk.priority.cmp(&a.chunk.priority))
        .then(a.chunk.page.cmp(&b.chunk.page))
        .then(a.chunk.source.cmp(&b.chunk.source))
}
