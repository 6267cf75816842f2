//! Contradiction detection and resolution over the working belief set
//!
//! Two beliefs contradict when they address the same subject with
//! incompatible polarity and their subjects are similar enough, or when one
//! statement is the direct negation of the other. Contradiction marks both
//! sides disputed, links them symmetrically (re-adding an existing link is a
//! no-op), and applies a one-time confidence penalty per newly discovered
//! pair.
//!
//! Resolution is re-evaluated every run so stale disputes cannot block
//! correction: links to retracted beliefs are dropped, a disputed belief far
//! below a confirmable opponent is superseded and retracted, and a belief
//! left without live conflicts returns to proposed or rises to confirmed.

use crate::config::ConsolidationConfig;
use crate::memory::belief::{Belief, BeliefStatus};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Counts of lifecycle transitions performed by one resolution pass
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolutionStats {
    /// Newly discovered conflicting pairs
    pub new_conflicts: usize,
    /// Beliefs currently disputed after the pass
    pub disputed: usize,
    /// Beliefs confirmed by the pass
    pub confirmed: usize,
    /// Beliefs retracted as superseded
    pub retracted: usize,
}

/// Compares beliefs pairwise and maintains the dispute lifecycle
pub struct ContradictionResolver {
    similarity_threshold: f64,
    dispute_penalty: f64,
    confirm_threshold: f64,
    supersede_threshold: f64,
}

impl ContradictionResolver {
    /// Create a resolver with the configured policy constants
    pub fn new(config: &ConsolidationConfig) -> Self {
        Self {
            similarity_threshold: config.similarity_threshold,
            dispute_penalty: config.dispute_penalty,
            confirm_threshold: config.confirm_threshold,
            supersede_threshold: config.supersede_threshold,
        }
    }

    /// Run one full detect-and-re-evaluate pass over the working set.
    pub fn resolve(&self, beliefs: &mut BTreeMap<Uuid, Belief>) -> ResolutionStats {
        let mut stats = ResolutionStats::default();

        stats.new_conflicts = self.link_new_conflicts(beliefs);
        self.supersede_weak(beliefs, &mut stats);
        self.drop_dead_links(beliefs);
        self.settle_statuses(beliefs, &mut stats);

        stats
    }

    /// Detect conflicting pairs not yet linked. Both sides become disputed,
    /// gain the mutual link, and take the penalty exactly once per pair.
    fn link_new_conflicts(&self, beliefs: &mut BTreeMap<Uuid, Belief>) -> usize {
        let ids: Vec<Uuid> = beliefs.keys().copied().collect();
        let mut new_pairs: Vec<(Uuid, Uuid)> = Vec::new();

        for (i, a_id) in ids.iter().enumerate() {
            for b_id in &ids[i + 1..] {
                let a = &beliefs[a_id];
                let b = &beliefs[b_id];
                if !a.status.is_live() || !b.status.is_live() {
                    continue;
                }
                if a.conflicts_with.contains(b_id) {
                    continue;
                }
                if self.contradicts(a, b) {
                    new_pairs.push((*a_id, *b_id));
                }
            }
        }

        for (a_id, b_id) in &new_pairs {
            for (id, other) in [(a_id, b_id), (b_id, a_id)] {
                let belief = beliefs.get_mut(id).expect("id from same map");
                belief.conflicts_with.insert(*other);
                belief.status = BeliefStatus::Disputed;
                belief.penalize(self.dispute_penalty);
            }
        }
        new_pairs.len()
    }

    /// A disputed belief whose confidence fell below the supersession
    /// threshold while an opposing side is confirmable gets retracted.
    fn supersede_weak(&self, beliefs: &mut BTreeMap<Uuid, Belief>, stats: &mut ResolutionStats) {
        let ids: Vec<Uuid> = beliefs.keys().copied().collect();

        for id in ids {
            let belief = &beliefs[&id];
            if belief.status != BeliefStatus::Disputed
                || belief.confidence >= self.supersede_threshold
            {
                continue;
            }
            let outgunned = belief.conflicts_with.iter().any(|other| {
                beliefs
                    .get(other)
                    .map(|o| o.status.is_live() && o.confidence >= self.confirm_threshold)
                    .unwrap_or(false)
            });
            if outgunned {
                let belief = beliefs.get_mut(&id).expect("id from same map");
                belief.status = BeliefStatus::Retracted;
                belief.updated_at = chrono::Utc::now();
                stats.retracted += 1;
            }
        }
    }

    /// Sever links involving retracted, archived, or missing beliefs on
    /// both ends, keeping the link relation symmetric.
    fn drop_dead_links(&self, beliefs: &mut BTreeMap<Uuid, Belief>) {
        let dead: BTreeSet<Uuid> = beliefs
            .iter()
            .filter(|(_, b)| !b.status.is_live())
            .map(|(id, _)| *id)
            .collect();
        let known: BTreeSet<Uuid> = beliefs.keys().copied().collect();

        for belief in beliefs.values_mut() {
            if belief.status.is_live() {
                belief
                    .conflicts_with
                    .retain(|other| known.contains(other) && !dead.contains(other));
            } else if !belief.conflicts_with.is_empty() {
                belief.conflicts_with.clear();
            }
        }
    }

    /// Settle statuses from the surviving link structure: live conflicts
    /// keep a belief disputed; otherwise confidence decides between
    /// confirmed and proposed.
    fn settle_statuses(&self, beliefs: &mut BTreeMap<Uuid, Belief>, stats: &mut ResolutionStats) {
        let live: BTreeSet<Uuid> = beliefs
            .iter()
            .filter(|(_, b)| b.status.is_live())
            .map(|(id, _)| *id)
            .collect();

        for belief in beliefs.values_mut() {
            if !belief.status.is_live() {
                continue;
            }
            let has_live_conflict = belief.conflicts_with.iter().any(|id| live.contains(id));
            let next = if has_live_conflict {
                BeliefStatus::Disputed
            } else if belief.confidence >= self.confirm_threshold {
                BeliefStatus::Confirmed
            } else {
                BeliefStatus::Proposed
            };

            if belief.status != next {
                belief.status = next;
                belief.updated_at = chrono::Utc::now();
            }
            match next {
                BeliefStatus::Disputed => stats.disputed += 1,
                BeliefStatus::Confirmed => stats.confirmed += 1,
                _ => {}
            }
        }
    }

    /// Two live beliefs contradict when their subjects are similar enough
    /// and they assert opposite polarity, or when one statement directly
    /// negates the other.
    fn contradicts(&self, a: &Belief, b: &Belief) -> bool {
        if let (Some(pa), Some(pb)) = (a.polarity, b.polarity) {
            if pa != pb && subject_similarity(&a.subject, &b.subject) >= self.similarity_threshold {
                return true;
            }
        }
        is_negation_conflict(&a.statement, &b.statement)
    }
}

/// Jaccard similarity between the token sets of two subjects
fn subject_similarity(a: &str, b: &str) -> f64 {
    let ta: BTreeSet<&str> = a.split_whitespace().collect();
    let tb: BTreeSet<&str> = b.split_whitespace().collect();
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let shared = ta.intersection(&tb).count() as f64;
    let union = ta.union(&tb).count() as f64;
    shared / union
}

/// Direct inverse phrasing: exactly one statement carries a negation token
/// and stripping negations makes one statement contain the other.
fn is_negation_conflict(a: &str, b: &str) -> bool {
    let norm_a = normalize_statement(a);
    let norm_b = normalize_statement(b);
    if norm_a == norm_b {
        return false;
    }

    let negated = |s: &str| {
        s.split_whitespace()
            .any(|t| matches!(t, "not" | "never" | "no"))
    };
    if negated(&norm_a) == negated(&norm_b) {
        return false;
    }

    let strip = |s: &str| {
        s.split_whitespace()
            .filter(|t| !matches!(*t, "not" | "never" | "no"))
            .collect::<Vec<_>>()
            .join(" ")
    };
    let stripped_a = strip(&norm_a);
    let stripped_b = strip(&norm_b);
    !stripped_a.is_empty()
        && !stripped_b.is_empty()
        && (stripped_a.contains(&stripped_b) || stripped_b.contains(&stripped_a))
}

fn normalize_statement(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .trim_end_matches(['.', '!', '?'])
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
