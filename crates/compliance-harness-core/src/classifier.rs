//! Rule-based query classifier.
//!
//! Classification is an ordered list of `(predicate, intent, confidence)`
//! rules evaluated top to bottom; the first matching rule wins. There is no
//! voting and no hidden state, so the same question always produces the
//! same [`QueryIntent`].
//!
//! | Order | Rule | Category | Confidence |
//! |-------|------|----------|------------|
//! | 1 | regulatory code reference (`E2/AS1`, `NZS 3604`, …) | `compliance_strict` | 0.95 |
//! | 2 | unit-bearing number (`150 mm`, `2.5 kPa`) | `compliance_strict` | 0.90 |
//! | 3 | requirement word + domain term (`minimum … flashing`) | `compliance_strict` | 0.85 |
//! | 4 | modal compliance check (`does … meet code`) | `implicit_compliance` | 0.75 |
//! | 5 | how-to phrasing + domain term | `general_help` | 0.65 |
//! | 6 | brand or comparison phrasing | `product_info` | 0.60 |
//! | 7 | consent / council process phrasing | `council_process` | 0.70 |
//! | – | nothing matched | `unknown` | 0.20 |
//!
//! Each category maps to an [`IntentProfile`] bundle (top-k, keyword boost,
//! citation policy).

use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::lexicon::{all_terms, matching_terms, normalize};
use crate::models::{CitationPolicy, IntentCategory, QueryIntent};

static CODE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:[a-h]\d{1,2}/(?:as|vm)\d{1,2}|nzs\s?\d{4}|nzbc|building code|acceptable solution|verification method|clause\s+[a-h]?\d)",
    )
    .expect("code reference pattern")
});

static UNIT_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b\d+(?:\.\d+)?\s?(?:mm|cm|m²|m2|m3|kpa|kn|kg|km/h|m/s|degrees|deg|°|%|l/s|litres|litre|m)(?:[^a-z0-9]|$)",
    )
    .expect("unit pattern")
});

static REQUIREMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:minimum|maximum|min|max|required|requirements?|must|shall|at least|no more than|clearance|how (?:far|high|deep|wide|many|much|long|close))\b",
    )
    .expect("requirement pattern")
});

static MODAL_COMPLIANCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:does|do|is|are|can|could|will|would|should|am)\b.*\b(?:meet|meets|comply|complies|compliant|compliance|acceptable|allowed|permitted|pass|code|legal)\b",
    )
    .expect("modal pattern")
});

static HOW_TO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:how (?:do|to|should|can|would)|best way|steps to|tips for|install|installing|fix|repair|replace)\b",
    )
    .expect("how-to pattern")
});

static PRODUCT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:colorsteel|zincalume|james hardie|hardie|gib|dimond|metalcraft|kingspan|resene|dulux|pink batts|ardex|tremco|marley|rockcote|vs\.?|versus|compare|comparison|better than|which brand|brand|product|warranty)\b",
    )
    .expect("product pattern")
});

static COUNCIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:consents?|council|inspections?|inspector|ccc|code compliance certificate|exempt|exemption|schedule 1|lim|pim|permit)\b",
    )
    .expect("council pattern")
});

static CITATION_REQUEST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:cite|citations?|sources?|references?|which clause|where does it say)\b",
    )
    .expect("citation request pattern")
});

static FOLLOW_UP_LEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:and|also|what about|how about|same for)\b").expect("follow-up pattern")
});

/// Questions this short are treated as follow-ups when a prior intent exists.
const FOLLOW_UP_MAX_WORDS: usize = 6;

/// Confidence decay applied when a follow-up inherits the prior intent.
const FOLLOW_UP_DECAY: f64 = 0.8;

/// Confidence assigned when no rule matched.
const UNKNOWN_CONFIDENCE: f64 = 0.2;

/// A question with its derived signals, handed to rule predicates.
#[derive(Debug, Clone)]
pub struct Question {
    pub raw: String,
    pub normalized: String,
    /// Building-domain terms present in the question.
    pub domain_terms: Vec<String>,
}

impl Question {
    pub fn new(text: &str) -> Self {
        let normalized = normalize(text);
        let domain_terms = matching_terms(&normalized, &all_terms())
            .into_iter()
            .map(str::to_string)
            .collect();
        Self {
            raw: text.to_string(),
            normalized,
            domain_terms,
        }
    }

    pub fn has_domain_terms(&self) -> bool {
        !self.domain_terms.is_empty()
    }

    pub fn word_count(&self) -> usize {
        self.normalized.split_whitespace().count()
    }
}

type Predicate = Box<dyn Fn(&Question) -> bool + Send + Sync>;

/// One classification rule.
pub struct Rule {
    pub label: String,
    predicate: Predicate,
    pub category: IntentCategory,
    pub confidence: f64,
}

impl Rule {
    pub fn new(
        label: impl Into<String>,
        category: IntentCategory,
        confidence: f64,
        predicate: impl Fn(&Question) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            predicate: Box::new(predicate),
            category,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn matches(&self, question: &Question) -> bool {
        (self.predicate)(question)
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("label", &self.label)
            .field("category", &self.category)
            .field("confidence", &self.confidence)
            .finish()
    }
}

/// The built-in rule list, in priority order.
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule::new(
            "code_reference",
            IntentCategory::ComplianceStrict,
            0.95,
            |q| CODE_REFERENCE.is_match(&q.normalized),
        ),
        Rule::new(
            "unit_measurement",
            IntentCategory::ComplianceStrict,
            0.90,
            |q| UNIT_NUMBER.is_match(&q.normalized),
        ),
        Rule::new(
            "requirement_phrase",
            IntentCategory::ComplianceStrict,
            0.85,
            |q| q.has_domain_terms() && REQUIREMENT.is_match(&q.normalized),
        ),
        Rule::new(
            "modal_compliance",
            IntentCategory::ImplicitCompliance,
            0.75,
            |q| MODAL_COMPLIANCE.is_match(&q.normalized),
        ),
        Rule::new(
            "how_to",
            IntentCategory::GeneralHelp,
            0.65,
            |q| q.has_domain_terms() && HOW_TO.is_match(&q.normalized),
        ),
        Rule::new(
            "product_comparison",
            IntentCategory::ProductInfo,
            0.60,
            |q| PRODUCT.is_match(&q.normalized),
        ),
        Rule::new(
            "council_process",
            IntentCategory::CouncilProcess,
            0.70,
            |q| COUNCIL.is_match(&q.normalized),
        ),
    ]
}

/// Retrieval parameters bundled with a category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IntentProfile {
    pub top_k: usize,
    pub keyword_boost: bool,
    pub citation_policy: CitationPolicy,
}

impl IntentProfile {
    const fn new(top_k: usize, keyword_boost: bool, max_citations: u8, show: bool) -> Self {
        Self {
            top_k,
            keyword_boost,
            citation_policy: CitationPolicy {
                max_citations,
                show_by_default: show,
            },
        }
    }

    /// Built-in bundle for a category.
    pub fn default_for(category: IntentCategory) -> Self {
        match category {
            IntentCategory::ComplianceStrict => Self::new(6, true, 3, true),
            IntentCategory::ImplicitCompliance => Self::new(5, true, 2, true),
            IntentCategory::GeneralHelp => Self::new(5, true, 1, false),
            IntentCategory::ProductInfo => Self::new(4, true, 1, false),
            IntentCategory::CouncilProcess => Self::new(4, true, 1, false),
            IntentCategory::Unknown => Self::new(3, false, 0, false),
        }
    }
}

/// Category → profile table.
#[derive(Debug, Clone)]
pub struct IntentProfiles {
    profiles: HashMap<IntentCategory, IntentProfile>,
}

impl IntentProfiles {
    /// Override the default `top_k` for one category.
    pub fn with_top_k(mut self, category: IntentCategory, top_k: usize) -> Self {
        if let Some(p) = self.profiles.get_mut(&category) {
            p.top_k = top_k;
        }
        self
    }

    pub fn get(&self, category: IntentCategory) -> IntentProfile {
        self.profiles
            .get(&category)
            .copied()
            .unwrap_or_else(|| IntentProfile::default_for(category))
    }
}

impl Default for IntentProfiles {
    fn default() -> Self {
        Self {
            profiles: IntentCategory::ALL
                .iter()
                .map(|c| (*c, IntentProfile::default_for(*c)))
                .collect(),
        }
    }
}

/// Ordered-rule classifier.
#[derive(Debug)]
pub struct IntentClassifier {
    rules: Vec<Rule>,
    profiles: IntentProfiles,
}

impl IntentClassifier {
    pub fn new(profiles: IntentProfiles) -> Self {
        Self {
            rules: default_rules(),
            profiles,
        }
    }

    /// Classifier with a custom rule list.
    pub fn with_rules(rules: Vec<Rule>, profiles: IntentProfiles) -> Self {
        Self { rules, profiles }
    }

    /// Append a rule after the existing ones.
    pub fn push_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    /// Insert a rule at `index` (clamped to the list length).
    pub fn insert_rule(&mut self, index: usize, rule: Rule) {
        let index = index.min(self.rules.len());
        self.rules.insert(index, rule);
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn profiles(&self) -> &IntentProfiles {
        &self.profiles
    }

    /// Classify a question, optionally in the context of the previous turn.
    pub fn classify(&self, text: &str, prior: Option<&QueryIntent>) -> QueryIntent {
        let question = Question::new(text);

        if let Some(rule) = self.rules.iter().find(|r| r.matches(&question)) {
            return self.build(&question, rule.category, rule.confidence, &rule.label);
        }

        if let Some(prior) = prior {
            if prior.category != IntentCategory::Unknown && is_follow_up(&question) {
                return self.build(
                    &question,
                    prior.category,
                    prior.confidence * FOLLOW_UP_DECAY,
                    "follow_up",
                );
            }
        }

        self.build(
            &question,
            IntentCategory::Unknown,
            UNKNOWN_CONFIDENCE,
            "fallback",
        )
    }

    /// Intent for an explicit caller-chosen category.
    pub fn resolve(&self, text: &str, category: IntentCategory) -> QueryIntent {
        let question = Question::new(text);
        self.build(&question, category, 1.0, "override")
    }

    fn build(
        &self,
        question: &Question,
        category: IntentCategory,
        confidence: f64,
        rule: &str,
    ) -> QueryIntent {
        let profile = self.profiles.get(category);
        QueryIntent {
            category,
            confidence,
            retrieval_bias_terms: question.domain_terms.clone(),
            citation_policy: profile.citation_policy,
            top_k: profile.top_k,
            keyword_boost: profile.keyword_boost,
            citations_requested: CITATION_REQUEST.is_match(&question.normalized),
            rule: rule.to_string(),
        }
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new(IntentProfiles::default())
    }
}

fn is_follow_up(question: &Question) -> bool {
    question.word_count() <= FOLLOW_UP_MAX_WORDS || FOLLOW_UP_LEAD.is_match(&question.normalized)
}
