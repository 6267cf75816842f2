//! Procedural skill data types
//!
//! A Skill is a reusable procedure with preconditions, ordered steps, known
//! failure modes, and a success rate. The success rate is updated only by the
//! Consolidator from episode outcomes referencing the skill.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// A reusable procedure with tracked reliability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    /// Unique skill identifier
    pub id: Uuid,
    /// Skill name, unique among skills
    pub name: String,
    /// When the skill applies
    pub preconditions: String,
    /// Ordered execution steps
    pub steps: Vec<String>,
    /// Observed ways the skill fails
    pub failure_modes: BTreeSet<String>,
    /// Exponentially smoothed success rate in [0, 1]
    pub success_rate: f64,
    /// Timestamp of the most recent outcome episode
    pub last_used: Option<DateTime<Utc>>,
    /// Ids of episodes whose outcomes fed the success rate
    pub evidence: BTreeSet<u64>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Skill {
    /// Create a skill shell from its first observed outcome. The initial
    /// success rate is the outcome itself.
    pub fn from_first_outcome(
        name: impl Into<String>,
        success: bool,
        episode_id: u64,
        at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            preconditions: String::new(),
            steps: Vec::new(),
            failure_modes: BTreeSet::new(),
            success_rate: if success { 1.0 } else { 0.0 },
            last_used: Some(at),
            evidence: BTreeSet::from([episode_id]),
            created_at: now,
            updated_at: now,
        }
    }

    /// Fold one outcome into the success rate:
    /// `new = old * (1 - alpha) + outcome * alpha`.
    pub fn record_outcome(
        &mut self,
        success: bool,
        alpha: f64,
        episode_id: u64,
        at: DateTime<Utc>,
        failure_mode: Option<String>,
    ) {
        let outcome = if success { 1.0 } else { 0.0 };
        self.success_rate = (self.success_rate * (1.0 - alpha) + outcome * alpha).clamp(0.0, 1.0);
        self.evidence.insert(episode_id);
        if self.last_used.map(|t| at > t).unwrap_or(true) {
            self.last_used = Some(at);
        }
        if let Some(mode) = failure_mode {
            self.failure_modes.insert(mode);
        }
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_outcome_sets_rate() {
        let ok = Skill::from_first_outcome("deploy", true, 1, Utc::now());
        assert!((ok.success_rate - 1.0).abs() < f64::EPSILON);

        let failed = Skill::from_first_outcome("deploy", false, 1, Utc::now());
        assert!((failed.success_rate - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_record_outcome_smoothing() {
        let mut skill = Skill::from_first_outcome("fetch", true, 1, Utc::now());
        skill.record_outcome(false, 0.3, 2, Utc::now(), None);
        assert!((skill.success_rate - 0.7).abs() < 1e-9);
        assert!(skill.evidence.contains(&1));
        assert!(skill.evidence.contains(&2));
    }

    #[test]
    fn test_failure_mode_accumulates() {
        let mut skill = Skill::from_first_outcome("parse", true, 1, Utc::now());
        skill.record_outcome(false, 0.3, 2, Utc::now(), Some("timeout".to_string()));
        skill.record_outcome(false, 0.3, 3, Utc::now(), Some("timeout".to_string()));
        assert_eq!(skill.failure_modes.len(), 1);
        assert!(skill.failure_modes.contains("timeout"));
    }

    #[test]
    fn test_last_used_keeps_newest() {
        let old = Utc::now() - chrono::Duration::days(2);
        let new = Utc::now();
        let mut skill = Skill::from_first_outcome("scan", true, 1, new);
        skill.record_outcome(true, 0.3, 2, old, None);
        assert_eq!(skill.last_used, Some(new));
    }
}
