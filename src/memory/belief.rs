//! Semantic belief data types
//!
//! A Belief is a claim with a confidence score and a dispute-aware lifecycle:
//! proposed -> confirmed, with excursions through disputed when contradicting
//! evidence appears, retracted when superseded, archived when shelved.
//! Conflict links are symmetric identifier sets resolved through the store at
//! read time, never object references, so cycles cost nothing to maintain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Ceiling for confidence of beliefs not backed by verified ground truth.
/// Corroboration approaches 1.0 asymptotically and never reaches it.
pub const UNVERIFIED_CEILING: f64 = 0.99;

/// Belief lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeliefStatus {
    /// Mined from episodes, awaiting enough corroboration
    Proposed,
    /// High confidence with no live conflicts
    Confirmed,
    /// At least one live conflicting belief exists
    Disputed,
    /// Superseded or withdrawn; kept for traceability, excluded from
    /// retrieval and from evidence citation
    Retracted,
    /// Shelved without judgment
    Archived,
}

impl BeliefStatus {
    /// Whether this belief still counts as live for conflict and evidence
    /// purposes.
    pub fn is_live(&self) -> bool {
        !matches!(self, BeliefStatus::Retracted | BeliefStatus::Archived)
    }
}

/// Direction of a claim toward its subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Affirms the subject (likes, can, is)
    Positive,
    /// Negates the subject (dislikes, cannot, is not)
    Negative,
}

/// A semantic claim with confidence and dispute-aware lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Belief {
    /// Unique belief identifier
    pub id: Uuid,
    /// Full statement, e.g. "User likely likes lo-fi music"
    pub statement: String,
    /// Normalized subject the statement is about
    pub subject: String,
    /// Asserted polarity toward the subject, when the statement has one
    pub polarity: Option<Polarity>,
    /// Confidence in [0, 1]; < 1.0 unless `verified`
    pub confidence: f64,
    /// Lifecycle status
    pub status: BeliefStatus,
    /// Backed by verified ground truth at creation
    pub verified: bool,
    /// Ids of episodes supporting this belief
    pub evidence: BTreeSet<u64>,
    /// Ids of beliefs this one conflicts with (symmetric)
    pub conflicts_with: BTreeSet<Uuid>,
    /// Optional embedding for vector retrieval
    pub embedding: Option<Vec<f32>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Belief {
    /// Create a freshly proposed belief from a mined candidate.
    ///
    /// Unverified confidence is capped strictly below 1.0.
    pub fn proposed(
        statement: impl Into<String>,
        subject: impl Into<String>,
        polarity: Option<Polarity>,
        confidence: f64,
        episode_id: u64,
        verified: bool,
    ) -> Self {
        let ceiling = if verified { 1.0 } else { UNVERIFIED_CEILING };
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            statement: statement.into(),
            subject: subject.into(),
            polarity,
            confidence: confidence.clamp(0.0, ceiling),
            status: BeliefStatus::Proposed,
            verified,
            evidence: BTreeSet::from([episode_id]),
            conflicts_with: BTreeSet::new(),
            embedding: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Asymptotic corroboration update: `new = old + (1 - old) * gain`.
    /// Confidence approaches but never reaches 1.0 from replay alone.
    pub fn corroborate(&mut self, gain: f64, episode_id: u64) {
        let ceiling = if self.verified { 1.0 } else { UNVERIFIED_CEILING };
        self.confidence = (self.confidence + (1.0 - self.confidence) * gain).min(ceiling);
        self.evidence.insert(episode_id);
        self.updated_at = Utc::now();
    }

    /// Reduce confidence by a fixed penalty, floored at 0.
    pub fn penalize(&mut self, penalty: f64) {
        self.confidence = (self.confidence - penalty).max(0.0);
        self.updated_at = Utc::now();
    }
}

/// Normalize free text into a comparable subject key: lowercase, collapsed
/// whitespace, no trailing punctuation.
pub fn normalize_subject(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches(['.', ',', ';', '!', '?'])
        .to_string()
}
