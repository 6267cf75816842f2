//! Self-model data types
//!
//! One entry per capability, keyed by name. Reliability scores are recomputed
//! by the Consolidator from skill success-rate history and never set directly
//! by callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The operator's assessment of one of its own capabilities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfModelEntry {
    /// Capability name (matches the skill it is derived from)
    pub capability: String,
    /// Reliability in [0, 1], derived from skill success rates
    pub reliability_score: f64,
    /// Known limitations, accumulated from observed failure modes
    pub limitations: BTreeSet<String>,
    /// Last recomputation timestamp
    pub updated_at: DateTime<Utc>,
}

impl SelfModelEntry {
    /// Build an entry from a skill's current reliability picture
    pub fn from_skill(
        capability: impl Into<String>,
        success_rate: f64,
        limitations: BTreeSet<String>,
    ) -> Self {
        Self {
            capability: capability.into(),
            reliability_score: success_rate.clamp(0.0, 1.0),
            limitations,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_skill_clamps() {
        let entry = SelfModelEntry::from_skill("deploy", 1.4, BTreeSet::new());
        assert!((entry.reliability_score - 1.0).abs() < f64::EPSILON);
    }
}
