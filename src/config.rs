//! Engram configuration management
//!
//! Every policy constant the consolidation and retrieval algorithms depend on
//! lives here rather than being hard-coded: the contradiction similarity
//! threshold, the corroboration gain, dispute penalty, confirmation and
//! supersession thresholds, salience decay, and the retrieval signal weights.
//! Defaults are documented on each field.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main Engram configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngramConfig {
    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Retrieval scoring configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Consolidation policy configuration
    #[serde(default)]
    pub consolidation: ConsolidationConfig,

    /// Forgetting policy configuration
    #[serde(default)]
    pub forgetting: ForgettingConfig,

    /// Session context buffer configuration
    #[serde(default)]
    pub context: ContextConfig,
}

impl EngramConfig {
    /// Load configuration from a TOML file
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| Error::Config(format!("cannot read config file: {e}")))?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("invalid config: {e}")))
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory for persisted memory state. `None` keeps all state
    /// in memory only (useful for tests and ephemeral operators).
    pub base_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: Some(default_base_dir()),
        }
    }
}

/// Default base directory (~/.engram/)
pub fn default_base_dir() -> PathBuf {
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".engram")
}

/// Retrieval scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Weight of the lexical-overlap signal (default 0.20)
    pub lexical_weight: f64,

    /// Weight of the recency signal (default 0.20)
    pub recency_weight: f64,

    /// Weight of the confidence signal (default 0.35)
    pub confidence_weight: f64,

    /// Weight of the vector-similarity signal (default 0.15). When a query
    /// or candidate carries no vector this weight is dropped and the
    /// remaining weights are renormalized.
    pub vector_weight: f64,

    /// Weight of the active-goal relevance boost (default 0.10)
    pub goal_weight: f64,

    /// Horizon in days over which the recency signal falls from 1 to 0
    /// (default 30)
    pub recency_horizon_days: f64,

    /// Default number of results returned by a query (default 10)
    pub default_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            lexical_weight: 0.20,
            recency_weight: 0.20,
            confidence_weight: 0.35,
            vector_weight: 0.15,
            goal_weight: 0.10,
            recency_horizon_days: 30.0,
            default_top_k: 10,
        }
    }
}

/// Consolidation policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
    /// Maximum episodes processed per run (default 256). Callers needing a
    /// bounded run duration tune this instead of interrupting mid-batch.
    pub batch_size: usize,

    /// Confidence assigned to heuristically extracted candidates
    /// (default 0.6)
    pub extraction_confidence: f64,

    /// Gain `k` of the asymptotic corroboration update
    /// `new = old + (1 - old) * k` (default 0.25)
    pub corroboration_gain: f64,

    /// Confidence penalty applied to each side of a newly discovered
    /// contradiction (default 0.15, floored at 0)
    pub dispute_penalty: f64,

    /// Confidence above which a belief with no live conflicts becomes
    /// confirmed (default 0.85)
    pub confirm_threshold: f64,

    /// Confidence below which a disputed belief is superseded by a
    /// confirmable opponent and retracted (default 0.2)
    pub supersede_threshold: f64,

    /// Minimum subject similarity for two opposite-polarity beliefs to be
    /// judged contradictory (default 0.6)
    pub similarity_threshold: f64,

    /// Exponential smoothing factor for skill success rates (default 0.3)
    pub skill_rate_alpha: f64,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            batch_size: 256,
            extraction_confidence: 0.6,
            corroboration_gain: 0.25,
            dispute_penalty: 0.15,
            confirm_threshold: 0.85,
            supersede_threshold: 0.2,
            similarity_threshold: 0.6,
            skill_rate_alpha: 0.3,
        }
    }
}

/// Forgetting policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgettingConfig {
    /// Salience half-life in days (default 30)
    pub half_life_days: f64,

    /// Decayed salience below which an uncited episode becomes prunable
    /// (default 0.05)
    pub prune_floor: f64,

    /// Salience assigned to episodes appended without an explicit value
    /// (default 1.0)
    pub default_salience: f64,
}

impl Default for ForgettingConfig {
    fn default() -> Self {
        Self {
            half_life_days: 30.0,
            prune_floor: 0.05,
            default_salience: 1.0,
        }
    }
}

/// Session context buffer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Maximum messages retained in the session buffer (default 30)
    pub capacity: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self { capacity: 30 }
    }
}
