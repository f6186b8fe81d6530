//! TOML configuration.
//!
//! Every section is optional except `[db]`; missing keys fall back to the
//! defaults below. [`load_config`] parses and validates in one step, so a
//! bad weight or pool bound stops the process before any request is served.
//!
//! ```toml
//! [db]
//! path = "./data/corpus.sqlite"
//!
//! [retrieval]
//! vector_weight = 0.6
//! keyword_weight = 0.2
//! source_bias_weight = 0.2
//!
//! [pool]
//! max = 4
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use compliance_harness_core::classifier::{IntentClassifier, IntentProfiles};
use compliance_harness_core::error::ConfigError;
use compliance_harness_core::family::FamilyTable;
use compliance_harness_core::models::{DocType, IntentCategory};
use compliance_harness_core::pipeline::Ranker;
use compliance_harness_core::scorer::{
    AmendmentDetector, HybridScorer, ScoringWeights, SourceBiasTable,
};
use compliance_harness_core::store::StoreFilter;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub intents: IntentsConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    /// Extra code-family prefixes, e.g. `NZS3604 = ["NZS 3604"]`.
    #[serde(default)]
    pub families: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,
    #[serde(default = "default_source_bias_weight")]
    pub source_bias_weight: f64,
    /// Candidates fetched from the store before ranking.
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
    /// Upper bound on a caller's requested k.
    #[serde(default = "default_max_k")]
    pub max_k: usize,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Rank with keyword and source signals when embeddings fail.
    #[serde(default = "default_true")]
    pub keyword_fallback: bool,
    #[serde(default)]
    pub always_resolve_hierarchy: bool,
    #[serde(default)]
    pub exclude_expired: bool,
    #[serde(default = "default_amendment_boost")]
    pub amendment_boost: f64,
    #[serde(default = "AmendmentDetector::default_patterns")]
    pub amendment_patterns: Vec<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_weight: default_vector_weight(),
            keyword_weight: default_keyword_weight(),
            source_bias_weight: default_source_bias_weight(),
            candidate_k: default_candidate_k(),
            max_k: default_max_k(),
            request_timeout_ms: default_request_timeout_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            keyword_fallback: true,
            always_resolve_hierarchy: false,
            exclude_expired: false,
            amendment_boost: default_amendment_boost(),
            amendment_patterns: AmendmentDetector::default_patterns(),
        }
    }
}

fn default_vector_weight() -> f64 {
    0.6
}
fn default_keyword_weight() -> f64 {
    0.2
}
fn default_source_bias_weight() -> f64 {
    0.2
}
fn default_candidate_k() -> usize {
    40
}
fn default_max_k() -> usize {
    20
}
fn default_request_timeout_ms() -> u64 {
    5000
}
fn default_retry_backoff_ms() -> u64 {
    100
}
fn default_true() -> bool {
    true
}
fn default_amendment_boost() -> f64 {
    0.5
}

/// Per-intent `top_k` defaults.
#[derive(Debug, Deserialize, Clone)]
pub struct IntentsConfig {
    #[serde(default = "default_strict_k")]
    pub compliance_strict: usize,
    #[serde(default = "default_five")]
    pub implicit_compliance: usize,
    #[serde(default = "default_five")]
    pub general_help: usize,
    #[serde(default = "default_four")]
    pub product_info: usize,
    #[serde(default = "default_four")]
    pub council_process: usize,
    #[serde(default = "default_unknown_k")]
    pub unknown: usize,
}

impl Default for IntentsConfig {
    fn default() -> Self {
        Self {
            compliance_strict: default_strict_k(),
            implicit_compliance: default_five(),
            general_help: default_five(),
            product_info: default_four(),
            council_process: default_four(),
            unknown: default_unknown_k(),
        }
    }
}

impl IntentsConfig {
    pub fn top_k(&self, category: IntentCategory) -> usize {
        match category {
            IntentCategory::ComplianceStrict => self.compliance_strict,
            IntentCategory::ImplicitCompliance => self.implicit_compliance,
            IntentCategory::GeneralHelp => self.general_help,
            IntentCategory::ProductInfo => self.product_info,
            IntentCategory::CouncilProcess => self.council_process,
            IntentCategory::Unknown => self.unknown,
        }
    }
}

fn default_strict_k() -> usize {
    6
}
fn default_five() -> usize {
    5
}
fn default_four() -> usize {
    4
}
fn default_unknown_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    /// Bias multiplier per code family.
    #[serde(default)]
    pub family_weights: BTreeMap<String, f64>,
    /// Authority weight per doc type, overriding the built-in table.
    #[serde(default)]
    pub doc_type_weights: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
            capacity: default_cache_capacity(),
        }
    }
}

fn default_cache_ttl() -> u64 {
    300
}
fn default_cache_capacity() -> u64 {
    1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct PoolConfig {
    #[serde(default = "default_pool_min")]
    pub min: usize,
    #[serde(default = "default_pool_max")]
    pub max: usize,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min: default_pool_min(),
            max: default_pool_max(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
        }
    }
}

impl PoolConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

fn default_pool_min() -> usize {
    1
}
fn default_pool_max() -> usize {
    4
}
fn default_acquire_timeout_ms() -> u64 {
    2000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_embedding_url")]
    pub url: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: default_embedding_url(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_embedding_url() -> String {
    "https://api.openai.com/v1/embeddings".to_string()
}
fn default_max_retries() -> u32 {
    2
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7431".to_string()
}

impl Config {
    /// Defaults everywhere, pointing at `db_path`.
    pub fn with_db(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            retrieval: RetrievalConfig::default(),
            intents: IntentsConfig::default(),
            sources: SourcesConfig::default(),
            families: BTreeMap::new(),
            cache: CacheConfig::default(),
            pool: PoolConfig::default(),
            embedding: EmbeddingConfig::default(),
            server: ServerConfig::default(),
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Check every cross-field constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.retrieval;
        self.scoring_weights()?;

        if r.candidate_k == 0 {
            return Err(ConfigError::new("retrieval.candidate_k", "must be > 0"));
        }
        if r.max_k == 0 {
            return Err(ConfigError::new("retrieval.max_k", "must be > 0"));
        }
        if r.request_timeout_ms == 0 {
            return Err(ConfigError::new("retrieval.request_timeout_ms", "must be > 0"));
        }
        if !(0.0..1.0).contains(&r.amendment_boost) {
            return Err(ConfigError::new(
                "retrieval.amendment_boost",
                format!("must be in [0.0, 1.0), got {}", r.amendment_boost),
            ));
        }
        AmendmentDetector::new(&r.amendment_patterns)?;

        for category in IntentCategory::ALL {
            if self.intents.top_k(category) == 0 {
                return Err(ConfigError::new(
                    format!("intents.{}", category.as_str()),
                    "top_k must be > 0",
                ));
            }
        }

        for (family, weight) in &self.sources.family_weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ConfigError::new(
                    format!("sources.family_weights.{}", family),
                    "must be a finite value >= 0",
                ));
            }
        }
        self.doc_type_weights()?;

        for (family, prefixes) in &self.families {
            if prefixes.iter().all(|p| p.trim().is_empty()) {
                return Err(ConfigError::new(
                    format!("families.{}", family),
                    "needs at least one prefix",
                ));
            }
        }

        if self.cache.capacity == 0 {
            return Err(ConfigError::new("cache.capacity", "must be > 0"));
        }

        if self.pool.max == 0 {
            return Err(ConfigError::new("pool.max", "must be > 0"));
        }
        if self.pool.min > self.pool.max {
            return Err(ConfigError::new(
                "pool.min",
                format!("must be <= pool.max ({}), got {}", self.pool.max, self.pool.min),
            ));
        }

        match self.embedding.provider.as_str() {
            "disabled" => {}
            "openai" => {
                if self.embedding.model.is_none() {
                    return Err(ConfigError::new(
                        "embedding.model",
                        "must be specified when provider is 'openai'",
                    ));
                }
                if matches!(self.embedding.dims, None | Some(0)) {
                    return Err(ConfigError::new(
                        "embedding.dims",
                        "must be > 0 when provider is 'openai'",
                    ));
                }
            }
            other => {
                return Err(ConfigError::new(
                    "embedding.provider",
                    format!("unknown provider '{}'; must be disabled or openai", other),
                ))
            }
        }

        Ok(())
    }

    pub fn scoring_weights(&self) -> Result<ScoringWeights, ConfigError> {
        ScoringWeights::new(
            self.retrieval.vector_weight,
            self.retrieval.keyword_weight,
            self.retrieval.source_bias_weight,
        )
    }

    fn doc_type_weights(&self) -> Result<Vec<(DocType, f64)>, ConfigError> {
        self.sources
            .doc_type_weights
            .iter()
            .map(|(name, weight)| {
                let field = format!("sources.doc_type_weights.{}", name);
                let doc_type = DocType::from(name.as_str());
                if doc_type == DocType::Unclassified && name != "unclassified" {
                    return Err(ConfigError::new(field, "unknown doc type"));
                }
                if !(0.0..=1.0).contains(weight) {
                    return Err(ConfigError::new(field, "must be in [0.0, 1.0]"));
                }
                Ok((doc_type, *weight))
            })
            .collect()
    }

    pub fn family_table(&self) -> FamilyTable {
        let mut table = FamilyTable::building_code();
        for (family, prefixes) in &self.families {
            for prefix in prefixes {
                table.add_prefix(family, prefix);
            }
        }
        table
    }

    pub fn build_classifier(&self) -> IntentClassifier {
        let profiles = IntentCategory::ALL
            .iter()
            .fold(IntentProfiles::default(), |p, c| {
                p.with_top_k(*c, self.intents.top_k(*c))
            });
        IntentClassifier::new(profiles)
    }

    pub fn build_ranker(&self) -> Result<Ranker, ConfigError> {
        let mut bias = SourceBiasTable::default();
        for (doc_type, weight) in self.doc_type_weights()? {
            bias = bias.with_doc_type_weight(doc_type, weight);
        }
        for (family, weight) in &self.sources.family_weights {
            bias = bias.with_family_weight(family, *weight);
        }
        let scorer = HybridScorer::new(
            self.scoring_weights()?,
            bias,
            AmendmentDetector::new(&self.retrieval.amendment_patterns)?,
            self.family_table(),
        )
        .with_amendment_boost(self.retrieval.amendment_boost);
        Ok(Ranker::new(scorer).always_resolve_hierarchy(self.retrieval.always_resolve_hierarchy))
    }

    pub fn store_filter(&self) -> StoreFilter {
        StoreFilter {
            doc_types: None,
            exclude_expired: self.retrieval.exclude_expired,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    Config::from_toml_str(&content)
}
