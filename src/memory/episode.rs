//! Episodic memory data types
//!
//! An Episode is a timestamped record of something the operator did or
//! observed. Payloads are immutable once appended; the only fields that ever
//! change afterwards are salience (decayed by the forgetting policy) and the
//! eventual replacement of the row by a tombstone when pruned. The content
//! hash is computed at append time and outlives the payload.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What kind of event an episode records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeKind {
    /// Something the operator did
    Action,
    /// Something the operator observed in its environment
    Observation,
    /// Raw sensory input (vision, audio transcription, ...)
    Perception,
    /// Runtime-internal events (startup, provider failures, ...)
    System,
}

/// Privacy classification of an episode payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyLevel {
    /// Safe to surface anywhere
    Public,
    /// Operator-internal, the default
    #[default]
    Internal,
    /// Must not leave the memory core
    Restricted,
}

impl PrivacyLevel {
    /// Normalize a free-form level string; unknown values map to `Internal`.
    pub fn normalize(level: &str) -> Self {
        match level.trim().to_lowercase().as_str() {
            "public" => Self::Public,
            "restricted" => Self::Restricted,
            _ => Self::Internal,
        }
    }
}

/// A timestamped episodic record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    /// Monotonically increasing identifier assigned by the store
    pub id: u64,
    /// Event kind
    pub kind: EpisodeKind,
    /// Textual payload, immutable once written
    pub payload: String,
    /// Optional structured fields accompanying the payload
    pub structured: Option<Map<String, Value>>,
    /// Decaying importance score, >= 0
    pub salience: f64,
    /// SHA-256 hex digest of the payload, stable across pruning
    pub content_hash: String,
    /// Searchable tags
    pub tags: Vec<String>,
    /// Privacy classification
    pub privacy: PrivacyLevel,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update (salience decay only)
    pub updated_at: DateTime<Utc>,
}

impl Episode {
    /// Whether the payload is explicitly marked as verified ground truth.
    /// Only such episodes may seed beliefs with confidence 1.0.
    pub fn is_verified(&self) -> bool {
        self.structured
            .as_ref()
            .and_then(|s| s.get("verified"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Structured string field accessor
    pub fn structured_str(&self, key: &str) -> Option<&str> {
        self.structured
            .as_ref()
            .and_then(|s| s.get(key))
            .and_then(Value::as_str)
    }
}

/// What remains of a pruned episode: provenance without content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeTombstone {
    /// The pruned episode's identifier
    pub episode_id: u64,
    /// Content hash of the removed payload
    pub content_hash: String,
    /// Original creation timestamp
    pub created_at: DateTime<Utc>,
    /// When the payload was removed
    pub pruned_at: DateTime<Utc>,
}

/// Evidence lookup result: the episode may be live or already pruned, but
/// its hash is retrievable either way.
#[derive(Debug, Clone, PartialEq)]
pub enum Evidence {
    /// The cited episode is still stored in full
    Live(Episode),
    /// The payload was pruned; only provenance remains
    Pruned(EpisodeTombstone),
}

impl Evidence {
    /// The content hash, regardless of pruning state
    pub fn content_hash(&self) -> &str {
        match self {
            Evidence::Live(episode) => &episode.content_hash,
            Evidence::Pruned(tombstone) => &tombstone.content_hash,
        }
    }

    /// The original episode timestamp
    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Evidence::Live(episode) => episode.created_at,
            Evidence::Pruned(tombstone) => tombstone.created_at,
        }
    }
}

/// Builder for the caller-supplied parts of an episode. The store assigns
/// id, hash, and timestamps at append time.
#[derive(Debug, Clone)]
pub struct EpisodeDraft {
    pub(crate) kind: EpisodeKind,
    pub(crate) payload: String,
    pub(crate) structured: Option<Map<String, Value>>,
    pub(crate) salience: Option<f64>,
    pub(crate) tags: Vec<String>,
    pub(crate) privacy: PrivacyLevel,
}

impl EpisodeDraft {
    /// Start a draft with the required kind and payload
    pub fn new(kind: EpisodeKind, payload: impl Into<String>) -> Self {
        Self {
            kind,
            payload: payload.into(),
            structured: None,
            salience: None,
            tags: Vec::new(),
            privacy: PrivacyLevel::default(),
        }
    }

    /// Attach structured fields
    pub fn structured(mut self, fields: Map<String, Value>) -> Self {
        self.structured = Some(fields);
        self
    }

    /// Override the default salience
    pub fn salience(mut self, salience: f64) -> Self {
        self.salience = Some(salience);
        self
    }

    /// Add a searchable tag
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Set the privacy classification
    pub fn privacy(mut self, privacy: PrivacyLevel) -> Self {
        self.privacy = privacy;
        self
    }

    /// Validate caller-supplied fields before any write
    pub(crate) fn validate(&self) -> Result<()> {
        if self.payload.trim().is_empty() {
            return Err(Error::Validation("episode payload is empty".to_string()));
        }
        if let Some(salience) = self.salience {
            if !salience.is_finite() || salience < 0.0 {
                return Err(Error::Validation(format!(
                    "episode salience must be finite and >= 0, got {salience}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privacy_normalize() {
        assert_eq!(PrivacyLevel::normalize("public"), PrivacyLevel::Public);
        assert_eq!(PrivacyLevel::normalize(" RESTRICTED "), PrivacyLevel::Restricted);
        assert_eq!(PrivacyLevel::normalize("internal"), PrivacyLevel::Internal);
        assert_eq!(PrivacyLevel::normalize("whatever"), PrivacyLevel::Internal);
    }

    #[test]
    fn test_draft_validation() {
        assert!(EpisodeDraft::new(EpisodeKind::Action, "did a thing")
            .validate()
            .is_ok());
        assert!(EpisodeDraft::new(EpisodeKind::Action, "   ")
            .validate()
            .is_err());
        assert!(EpisodeDraft::new(EpisodeKind::Action, "x")
            .salience(-1.0)
            .validate()
            .is_err());
        assert!(EpisodeDraft::new(EpisodeKind::Action, "x")
            .salience(f64::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn test_is_verified() {
        let mut structured = Map::new();
        structured.insert("verified".to_string(), Value::Bool(true));

        let episode = Episode {
            id: 1,
            kind: EpisodeKind::Observation,
            payload: "ground truth".to_string(),
            structured: Some(structured),
            salience: 1.0,
            content_hash: String::new(),
            tags: vec![],
            privacy: PrivacyLevel::Internal,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(episode.is_verified());

        let plain = Episode {
            structured: None,
            ..episode
        };
        assert!(!plain.is_verified());
    }

    #[test]
    fn test_evidence_hash_survives_pruning() {
        let tombstone = EpisodeTombstone {
            episode_id: 7,
            content_hash: "abc123".to_string(),
            created_at: Utc::now(),
            pruned_at: Utc::now(),
        };
        let evidence = Evidence::Pruned(tombstone);
        assert_eq!(evidence.content_hash(), "abc123");
    }
}
