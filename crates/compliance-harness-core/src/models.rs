//! Core data models shared by the retrieval pipeline.
//!
//! [`DocumentChunk`] is the unit of retrievable content. It is produced by
//! the external ingestion pipeline and treated as read-only here. Everything
//! else in this module ([`QueryIntent`], [`RankedChunk`], [`Citation`],
//! [`Degradation`]) is derived per request and never persisted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of characters kept when a snippet is derived from chunk content.
pub const SNIPPET_CHARS: usize = 240;

/// Sub-kind of a manufacturer manual (`manufacturer_manual_<kind>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ManualKind {
    Installation,
    Technical,
    Warranty,
    Other,
}

impl ManualKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManualKind::Installation => "installation",
            ManualKind::Technical => "technical",
            ManualKind::Warranty => "warranty",
            ManualKind::Other => "other",
        }
    }
}

/// Authority class of a source document.
///
/// Serialized as snake_case strings (`acceptable_solution_current`,
/// `manufacturer_manual_installation`, ...). Unknown strings map to
/// [`DocType::Unclassified`] so partially-enriched rows still load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DocType {
    AcceptableSolutionCurrent,
    AcceptableSolutionLegacy,
    VerificationMethodCurrent,
    VerificationMethodLegacy,
    IndustryCodeOfPractice,
    ManufacturerManual(ManualKind),
    NzStandard,
    HandbookGuide,
    #[default]
    Unclassified,
}

impl DocType {
    pub fn as_str(&self) -> String {
        match self {
            DocType::AcceptableSolutionCurrent => "acceptable_solution_current".to_string(),
            DocType::AcceptableSolutionLegacy => "acceptable_solution_legacy".to_string(),
            DocType::VerificationMethodCurrent => "verification_method_current".to_string(),
            DocType::VerificationMethodLegacy => "verification_method_legacy".to_string(),
            DocType::IndustryCodeOfPractice => "industry_code_of_practice".to_string(),
            DocType::ManufacturerManual(kind) => format!("manufacturer_manual_{}", kind.as_str()),
            DocType::NzStandard => "nz_standard".to_string(),
            DocType::HandbookGuide => "handbook_guide".to_string(),
            DocType::Unclassified => "unclassified".to_string(),
        }
    }

    /// Rank used by the hierarchy resolver. Lower is more authoritative.
    pub fn precedence(&self) -> u8 {
        match self {
            DocType::AcceptableSolutionCurrent => 0,
            DocType::VerificationMethodCurrent => 1,
            DocType::IndustryCodeOfPractice => 2,
            DocType::AcceptableSolutionLegacy => 3,
            DocType::VerificationMethodLegacy => 4,
            DocType::NzStandard => 5,
            DocType::HandbookGuide => 6,
            DocType::ManufacturerManual(_) => 7,
            DocType::Unclassified => 8,
        }
    }

    /// Static authority weight in `[0, 1]` used by the source-bias signal.
    pub fn default_weight(&self) -> f64 {
        match self {
            DocType::AcceptableSolutionCurrent => 1.0,
            DocType::VerificationMethodCurrent => 0.9,
            DocType::IndustryCodeOfPractice => 0.6,
            DocType::NzStandard => 0.6,
            DocType::AcceptableSolutionLegacy => 0.45,
            DocType::VerificationMethodLegacy => 0.4,
            DocType::HandbookGuide => 0.4,
            DocType::ManufacturerManual(_) => 0.35,
            DocType::Unclassified => 0.2,
        }
    }
}

impl From<&str> for DocType {
    fn from(value: &str) -> Self {
        let v = value.trim().to_ascii_lowercase();
        match v.as_str() {
            "acceptable_solution_current" => DocType::AcceptableSolutionCurrent,
            "acceptable_solution_legacy" => DocType::AcceptableSolutionLegacy,
            "verification_method_current" => DocType::VerificationMethodCurrent,
            "verification_method_legacy" => DocType::VerificationMethodLegacy,
            "industry_code_of_practice" => DocType::IndustryCodeOfPractice,
            "nz_standard" => DocType::NzStandard,
            "handbook_guide" => DocType::HandbookGuide,
            other => match other.strip_prefix("manufacturer_manual") {
                Some(rest) => DocType::ManufacturerManual(match rest.trim_start_matches('_') {
                    "installation" => ManualKind::Installation,
                    "technical" => ManualKind::Technical,
                    "warranty" => ManualKind::Warranty,
                    _ => ManualKind::Other,
                }),
                None => DocType::Unclassified,
            },
        }
    }
}

impl From<String> for DocType {
    fn from(value: String) -> Self {
        DocType::from(value.as_str())
    }
}

impl From<DocType> for String {
    fn from(value: DocType) -> Self {
        value.as_str()
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

/// Lifecycle status of a document edition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DocStatus {
    #[default]
    Current,
    Legacy,
    Expired,
}

impl DocStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocStatus::Current => "current",
            DocStatus::Legacy => "legacy",
            DocStatus::Expired => "expired",
        }
    }

    /// Multiplier applied to the static source bias.
    pub fn bias_factor(&self) -> f64 {
        match self {
            DocStatus::Current => 1.0,
            DocStatus::Legacy => 0.8,
            DocStatus::Expired => 0.5,
        }
    }
}

impl From<String> for DocStatus {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "legacy" => DocStatus::Legacy,
            "expired" => DocStatus::Expired,
            _ => DocStatus::Current,
        }
    }
}

impl From<DocStatus> for String {
    fn from(value: DocStatus) -> Self {
        value.as_str().to_string()
    }
}

/// A unit of retrievable content.
///
/// Uniquely identified by `(source, page)` for deduplication purposes.
/// Optional metadata may be missing on rows the enrichment jobs have not
/// reached yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Document name, e.g. `"E2/AS1"`.
    pub source: String,
    pub page: u32,
    pub content: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub clause: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub doc_type: DocType,
    #[serde(default)]
    pub status: DocStatus,
    /// Integer authority score; higher wins ties.
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub trade: Option<String>,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub version_label: Option<String>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl DocumentChunk {
    /// Minimal chunk with every optional field empty.
    pub fn new(source: impl Into<String>, page: u32, content: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            page,
            content: content.into(),
            snippet: String::new(),
            section: None,
            clause: None,
            embedding: Vec::new(),
            doc_type: DocType::Unclassified,
            status: DocStatus::Current,
            priority: 0,
            trade: None,
            phase: None,
            version_label: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    /// Deduplication key.
    pub fn key(&self) -> (&str, u32) {
        (self.source.as_str(), self.page)
    }

    /// The stored snippet, or the leading characters of the content.
    pub fn display_snippet(&self) -> String {
        if self.snippet.trim().is_empty() {
            self.content.chars().take(SNIPPET_CHARS).collect()
        } else {
            self.snippet.clone()
        }
    }
}

/// Question category produced by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    ComplianceStrict,
    ImplicitCompliance,
    GeneralHelp,
    ProductInfo,
    CouncilProcess,
    Unknown,
}

impl IntentCategory {
    pub const ALL: [IntentCategory; 6] = [
        IntentCategory::ComplianceStrict,
        IntentCategory::ImplicitCompliance,
        IntentCategory::GeneralHelp,
        IntentCategory::ProductInfo,
        IntentCategory::CouncilProcess,
        IntentCategory::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentCategory::ComplianceStrict => "compliance_strict",
            IntentCategory::ImplicitCompliance => "implicit_compliance",
            IntentCategory::GeneralHelp => "general_help",
            IntentCategory::ProductInfo => "product_info",
            IntentCategory::CouncilProcess => "council_process",
            IntentCategory::Unknown => "unknown",
        }
    }

    /// Whether the hierarchy resolver must always run for this category.
    pub fn requires_single_authority(&self) -> bool {
        matches!(
            self,
            IntentCategory::ComplianceStrict | IntentCategory::ImplicitCompliance
        )
    }
}

impl FromStr for IntentCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        IntentCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| {
                format!(
                    "unknown intent '{}'. Use one of: {}",
                    s,
                    IntentCategory::ALL
                        .iter()
                        .map(|c| c.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }
}

impl fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How many citations an intent produces, and whether they are shown unasked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationPolicy {
    pub max_citations: u8,
    pub show_by_default: bool,
}

/// Classification result for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryIntent {
    pub category: IntentCategory,
    pub confidence: f64,
    /// Domain terms found in the question.
    pub retrieval_bias_terms: Vec<String>,
    pub citation_policy: CitationPolicy,
    pub top_k: usize,
    pub keyword_boost: bool,
    /// The question explicitly asks for sources or references.
    pub citations_requested: bool,
    /// Label of the rule that produced this intent.
    pub rule: String,
}

impl QueryIntent {
    /// Number of citations to emit for this request.
    pub fn citation_limit(&self) -> usize {
        let max = self.citation_policy.max_citations as usize;
        if self.citation_policy.show_by_default {
            max
        } else if self.citations_requested {
            max.max(1)
        } else {
            0
        }
    }
}

/// Per-signal breakdown of a hybrid score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub vector_similarity: f64,
    pub keyword_boost: f64,
    pub source_bias: f64,
    pub vector_weight: f64,
    pub keyword_weight: f64,
    pub source_bias_weight: f64,
    /// The query named an amendment that matched this chunk.
    pub amendment_match: bool,
}

/// A ranked passage returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedChunk {
    pub source: String,
    pub page: u32,
    pub content: String,
    pub snippet: String,
    pub final_score: f64,
    pub doc_type: DocType,
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explain: Option<ScoreBreakdown>,
}

/// Kind of locator a citation points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorType {
    Clause,
    Table,
    Figure,
    Page,
    /// No locator could be found; the citation names the source only.
    Source,
}

impl LocatorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocatorType::Clause => "clause",
            LocatorType::Table => "table",
            LocatorType::Figure => "figure",
            LocatorType::Page => "page",
            LocatorType::Source => "source",
        }
    }
}

impl FromStr for LocatorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clause" => Ok(LocatorType::Clause),
            "table" => Ok(LocatorType::Table),
            "figure" => Ok(LocatorType::Figure),
            "page" => Ok(LocatorType::Page),
            "source" => Ok(LocatorType::Source),
            other => Err(format!("unknown locator type '{}'", other)),
        }
    }
}

/// A citable reference to a passage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub source: String,
    pub locator_type: LocatorType,
    pub locator_value: String,
    /// Page shown alongside the locator, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub display_text: String,
}

/// A degraded path taken while serving a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// Embeddings were unavailable; ranking used keyword and source signals only.
    KeywordOnly { reason: String },
    /// The corpus store failed after retry; no results were produced.
    RetrievalUnavailable { reason: String },
    /// The request-level timeout fired.
    Timeout { after_ms: u64 },
    /// No clause/table/figure/page was found for a cited passage.
    MalformedLocator { source: String },
}

impl Degradation {
    pub fn label(&self) -> &'static str {
        match self {
            Degradation::KeywordOnly { .. } => "keyword_only",
            Degradation::RetrievalUnavailable { .. } => "retrieval_unavailable",
            Degradation::Timeout { .. } => "timeout",
            Degradation::MalformedLocator { .. } => "malformed_locator",
        }
    }

    /// Whether the degradation came from an outage rather than the corpus
    /// content. Responses carrying one must not be cached.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Degradation::MalformedLocator { .. })
    }
}

/// The full answer to a `retrieve()` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResponse {
    pub results: Vec<RankedChunk>,
    pub citations: Vec<Citation>,
    pub cache_hit: bool,
    pub intent: QueryIntent,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<Degradation>,
}

impl RetrievalResponse {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    /// Whether any recorded degradation is transient.
    pub fn has_transient_degradation(&self) -> bool {
        self.degraded.iter().any(Degradation::is_transient)
    }

    /// Whether a degradation with the given label was recorded.
    pub fn has_degradation(&self, label: &str) -> bool {
        self.degraded.iter().any(|d| d.label() == label)
    }
}
