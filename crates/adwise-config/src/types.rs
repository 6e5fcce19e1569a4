//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [analysis]               # which threshold profile to run
//! [profiles.weekly]        # named threshold profiles (override built-ins)
//! [embedding]              # embedding provider + model
//! [memory]                 # memory (RAG) database
//! [metrics]                # metrics database
//! [retrieval]              # retrieval limits
//! [indexer]                # run summary limits
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Name of the long-window profile used for an initial evaluation.
pub const BASELINE_PROFILE: &str = "baseline";

/// Name of the short-window profile used for weekly operations.
pub const WEEKLY_PROFILE: &str = "weekly";

/// Default sentence-transformer model used for document embeddings.
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdwiseConfig {
    /// Analysis run settings.
    pub analysis: Option<AnalysisConfig>,

    /// Named threshold profiles. Entries override the built-in profile of
    /// the same name.
    pub profiles: BTreeMap<String, ThresholdProfile>,

    /// Embedding provider configuration.
    pub embedding: Option<EmbeddingConfig>,

    /// Memory (RAG document) store configuration.
    pub memory: Option<MemoryConfig>,

    /// Metrics store configuration.
    pub metrics: Option<MetricsConfig>,

    /// Retrieval engine configuration.
    pub retrieval: Option<RetrievalConfig>,

    /// Run indexer configuration.
    pub indexer: Option<IndexerConfig>,
}

impl AdwiseConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: AdwiseConfig) {
        if other.analysis.is_some() {
            self.analysis = other.analysis;
        }

        for (name, profile) in other.profiles {
            self.profiles.insert(name, profile);
        }

        if other.embedding.is_some() {
            self.embedding = other.embedding;
        }

        if other.memory.is_some() {
            self.memory = other.memory;
        }

        if other.metrics.is_some() {
            self.metrics = other.metrics;
        }

        if other.retrieval.is_some() {
            self.retrieval = other.retrieval;
        }

        if other.indexer.is_some() {
            self.indexer = other.indexer;
        }
    }

    /// Name of the profile selected by `[analysis] profile`.
    pub fn active_profile_name(&self) -> &str {
        self.analysis
            .as_ref()
            .map(|a| a.profile.as_str())
            .unwrap_or(WEEKLY_PROFILE)
    }

    /// Resolve and validate a threshold profile by name.
    ///
    /// Resolution order:
    /// 1. `[profiles.<name>]` from the loaded config layers
    /// 2. built-in `baseline` / `weekly`
    pub fn profile(&self, name: &str) -> crate::Result<ThresholdProfile> {
        let profile = match self.profiles.get(name) {
            Some(p) => p.clone(),
            None => match name {
                BASELINE_PROFILE => ThresholdProfile::baseline(),
                WEEKLY_PROFILE => ThresholdProfile::weekly(),
                _ => {
                    return Err(ConfigError::ProfileNotFound {
                        name: name.to_string(),
                        available: self.profile_names().join(", "),
                    });
                }
            },
        };

        profile.validate(name)?;
        Ok(profile)
    }

    /// All profile names known to this config (built-ins included), sorted.
    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        for builtin in [BASELINE_PROFILE, WEEKLY_PROFILE] {
            if !self.profiles.contains_key(builtin) {
                names.push(builtin.to_string());
            }
        }
        names.sort();
        names
    }

    /// Embedding settings, falling back to defaults.
    pub fn embedding(&self) -> EmbeddingConfig {
        self.embedding.clone().unwrap_or_default()
    }

    /// Memory settings, falling back to defaults.
    pub fn memory(&self) -> MemoryConfig {
        self.memory.clone().unwrap_or_default()
    }

    /// Metrics settings, falling back to defaults.
    pub fn metrics(&self) -> MetricsConfig {
        self.metrics.clone().unwrap_or_default()
    }

    /// Retrieval settings, falling back to defaults.
    pub fn retrieval(&self) -> RetrievalConfig {
        self.retrieval.clone().unwrap_or_default()
    }

    /// Indexer settings, falling back to defaults.
    pub fn indexer(&self) -> IndexerConfig {
        self.indexer.clone().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Analysis / Threshold Profiles
// ─────────────────────────────────────────────────────────────────────────────

/// Analysis run settings.
///
/// ```toml
/// [analysis]
/// profile = "baseline"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Threshold profile used when no `--profile` flag is given.
    pub profile: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            profile: WEEKLY_PROFILE.to_string(),
        }
    }
}

/// A named set of rule cutoffs plus the decision window they apply to.
///
/// ```toml
/// [profiles.weekly]
/// window_days = 7
/// search_terms = { min_clicks = 10, min_cost = 20.0 }
/// campaign_winners = { min_roas = 1.2, min_conversions = 2.0, min_cost = 200.0 }
/// campaign_losers = { min_cost = 300.0, conversions_equals = 0.0 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdProfile {
    /// Trailing number of days of data considered.
    pub window_days: u32,
    /// Negative-keyword cutoffs.
    pub search_terms: SearchTermThresholds,
    /// Scale-candidate cutoffs.
    pub campaign_winners: WinnerThresholds,
    /// Pause-candidate cutoffs.
    pub campaign_losers: LoserThresholds,
}

/// Cutoffs for search terms spending without converting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchTermThresholds {
    pub min_clicks: u64,
    pub min_cost: f64,
}

/// Cutoffs for campaigns worth scaling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WinnerThresholds {
    pub min_roas: f64,
    pub min_conversions: f64,
    pub min_cost: f64,
}

/// Cutoffs for campaigns to pause or restructure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoserThresholds {
    pub min_cost: f64,
    pub conversions_equals: f64,
}

impl ThresholdProfile {
    /// Long-window profile with stricter search-term cutoffs.
    pub fn baseline() -> Self {
        Self {
            window_days: 180,
            search_terms: SearchTermThresholds {
                min_clicks: 20,
                min_cost: 30.0,
            },
            campaign_winners: WinnerThresholds::default(),
            campaign_losers: LoserThresholds::default(),
        }
    }

    /// 7-day profile for weekly operations.
    pub fn weekly() -> Self {
        Self {
            window_days: 7,
            search_terms: SearchTermThresholds {
                min_clicks: 10,
                min_cost: 20.0,
            },
            campaign_winners: WinnerThresholds::default(),
            campaign_losers: LoserThresholds::default(),
        }
    }

    /// Check the profile invariants: window > 0 and every cutoff finite and
    /// non-negative.
    pub fn validate(&self, name: &str) -> crate::Result<()> {
        let invalid = |reason: String| ConfigError::InvalidProfile {
            name: name.to_string(),
            reason,
        };

        if self.window_days == 0 {
            return Err(invalid("window_days must be greater than 0".to_string()));
        }

        let cutoffs = [
            ("search_terms.min_cost", self.search_terms.min_cost),
            ("campaign_winners.min_roas", self.campaign_winners.min_roas),
            (
                "campaign_winners.min_conversions",
                self.campaign_winners.min_conversions,
            ),
            ("campaign_winners.min_cost", self.campaign_winners.min_cost),
            ("campaign_losers.min_cost", self.campaign_losers.min_cost),
            (
                "campaign_losers.conversions_equals",
                self.campaign_losers.conversions_equals,
            ),
        ];

        for (field, value) in cutoffs {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!(
                    "{field} must be a non-negative number, got {value}"
                )));
            }
        }

        Ok(())
    }
}

impl Default for WinnerThresholds {
    fn default() -> Self {
        Self {
            min_roas: 1.2,
            min_conversions: 2.0,
            min_cost: 200.0,
        }
    }
}

impl Default for LoserThresholds {
    fn default() -> Self {
        Self {
            min_cost: 300.0,
            conversions_equals: 0.0,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedding Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Embedding provider configuration.
///
/// ```toml
/// [embedding]
/// provider = "local"        # "local", "openai", or "hash"
/// model = "sentence-transformers/all-MiniLM-L6-v2"
/// dimensions = 384
///
/// [embedding.local]
/// model_dir = "~/.local/share/adwise/models"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider: "local" (ONNX), "openai", or "hash".
    pub provider: EmbeddingProvider,
    /// Model identifier recorded with every stored vector.
    pub model: String,
    /// Output embedding dimensions. Default depends on provider.
    pub dimensions: Option<usize>,
    /// OpenAI-specific embedding settings.
    pub openai: Option<EmbeddingOpenAiConfig>,
    /// Local ONNX-specific settings.
    pub local: Option<EmbeddingLocalConfig>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Local,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimensions: None,
            openai: None,
            local: None,
        }
    }
}

impl EmbeddingConfig {
    /// Effective dimensions for the configured provider.
    pub fn effective_dimensions(&self) -> usize {
        if let Some(d) = self.dimensions {
            return d;
        }
        match self.provider {
            EmbeddingProvider::Local | EmbeddingProvider::Hash => 384,
            EmbeddingProvider::OpenAi => match self.model.as_str() {
                "text-embedding-3-large" => 3072,
                _ => 1536,
            },
        }
    }
}

/// Supported embedding providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local ONNX Runtime inference (default, offline-first).
    Local,
    /// OpenAI embeddings API.
    OpenAi,
    /// Deterministic hashing embedder (offline, no model files).
    Hash,
}

/// OpenAI embedding provider settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingOpenAiConfig {
    /// Custom base URL (for proxies).
    pub base_url: Option<String>,
    /// API key (prefer the OPENAI_API_KEY env var).
    pub api_key: Option<String>,
}

/// Local ONNX embedding settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingLocalConfig {
    /// Directory holding one sub-directory per model, each with
    /// `model.onnx` and `tokenizer.json`.
    pub model_dir: Option<PathBuf>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Storage Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Memory (RAG document) store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Path to the SQLite database for documents and embeddings.
    pub database: PathBuf,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("rag.sqlite"),
        }
    }
}

/// Metrics store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Path to the SQLite database holding daily metric rows.
    pub database: PathBuf,
    /// Restrict analysis to one customer account.
    pub customer_id: Option<String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("data.sqlite"),
            customer_id: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Retrieval / Indexing Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Retrieval engine configuration.
///
/// ```toml
/// [retrieval]
/// top_k = 5
/// candidate_limit = 200
/// content_chars = 2500
/// doc_types = ["run_summary", "recommendations"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of snippets returned by default.
    pub top_k: usize,
    /// Most recent documents scanned per query.
    pub candidate_limit: usize,
    /// Character budget for each returned snippet.
    pub content_chars: usize,
    /// Document types searched by default.
    pub doc_types: Vec<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            candidate_limit: 200,
            content_chars: 2500,
            doc_types: vec!["run_summary".to_string(), "recommendations".to_string()],
        }
    }
}

/// Run indexer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Campaign actions listed in the run summary.
    pub max_campaign_actions: usize,
    /// Search-term actions listed in the run summary.
    pub max_search_term_actions: usize,
    /// Leading recommendation lines copied into the run summary.
    pub recommendation_head_lines: usize,
    /// Leading recommendation characters used for its embedding.
    pub recommendation_embed_chars: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            max_campaign_actions: 8,
            max_search_term_actions: 8,
            recommendation_head_lines: 40,
            recommendation_embed_chars: 8000,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
