//! Forgetting policy: salience decay and episode pruning
//!
//! Applies to episodes only. Salience decays exponentially with age unless
//! the episode is cited as evidence by a live belief or a skill; cited
//! episodes are never decayed or pruned, evidence durability takes precedence
//! over reclamation. An uncited episode whose decayed salience falls below
//! the floor is pruned: the payload goes away, the content hash and timestamp
//! stay behind in a tombstone.

use crate::config::ForgettingConfig;
use crate::memory::episode::Episode;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// The forgetting pass output, applied as part of the consolidation batch
#[derive(Debug, Clone, Default)]
pub struct ForgettingPlan {
    /// Decayed salience per surviving episode
    pub salience_updates: Vec<(u64, f64)>,
    /// Episodes whose payloads are removed
    pub prunes: Vec<u64>,
}

/// Decays and prunes low-salience episodes while preserving provenance
pub struct ForgettingPolicy {
    half_life_days: f64,
    prune_floor: f64,
}

impl ForgettingPolicy {
    /// Create a policy with the configured decay constants
    pub fn new(config: &ForgettingConfig) -> Self {
        Self {
            half_life_days: config.half_life_days.max(f64::MIN_POSITIVE),
            prune_floor: config.prune_floor,
        }
    }

    /// Plan one decay-and-prune pass.
    ///
    /// `cited` is the union of evidence ids held by live beliefs and skills;
    /// those episodes are left untouched regardless of age.
    pub fn plan(
        &self,
        episodes: &BTreeMap<u64, Episode>,
        cited: &BTreeSet<u64>,
        now: DateTime<Utc>,
    ) -> ForgettingPlan {
        let mut plan = ForgettingPlan::default();

        for episode in episodes.values() {
            if cited.contains(&episode.id) {
                continue;
            }

            let decayed = episode.salience * self.decay_factor(episode.updated_at, now);
            if decayed < self.prune_floor {
                plan.prunes.push(episode.id);
            } else if decayed < episode.salience {
                plan.salience_updates.push((episode.id, decayed));
            }
        }
        plan
    }

    /// Multiplicative decay since the last salience update: half the value
    /// per half-life. Successive passes compose into one exponential in
    /// total age, so decay is monotonic no matter how often the pass runs.
    fn decay_factor(&self, since: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let age_days = (now - since).num_seconds().max(0) as f64 / 86_400.0;
        0.5_f64.powf(age_days / self.half_life_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::episode::{EpisodeKind, PrivacyLevel};
    use chrono::Duration;

    fn episode(id: u64, salience: f64, age_days: i64) -> Episode {
        let at = Utc::now() - Duration::days(age_days);
        Episode {
            id,
            kind: EpisodeKind::Observation,
            payload: format!("episode {id}"),
            structured: None,
            salience,
            content_hash: format!("hash-{id}"),
            tags: vec![],
            privacy: PrivacyLevel::Internal,
            created_at: at,
            updated_at: at,
        }
    }

    fn policy() -> ForgettingPolicy {
        ForgettingPolicy::new(&ForgettingConfig::default())
    }

    #[test]
    fn test_fresh_episode_kept() {
        let episodes = BTreeMap::from([(1, episode(1, 1.0, 0))]);
        let plan = policy().plan(&episodes, &BTreeSet::new(), Utc::now());
        assert!(plan.prunes.is_empty());
        // No meaningful decay yet
        assert!(plan.salience_updates.is_empty() || plan.salience_updates[0].1 > 0.99);
    }

    #[test]
    fn test_old_uncited_episode_pruned() {
        // 1.0 salience halves every 30 days; after 180 days it is ~0.016,
        // below the 0.05 floor
        let episodes = BTreeMap::from([(1, episode(1, 1.0, 180))]);
        let plan = policy().plan(&episodes, &BTreeSet::new(), Utc::now());
        assert_eq!(plan.prunes, vec![1]);
    }

    #[test]
    fn test_cited_episode_never_pruned() {
        let episodes = BTreeMap::from([(1, episode(1, 1.0, 3650))]);
        let cited = BTreeSet::from([1]);
        let plan = policy().plan(&episodes, &cited, Utc::now());
        assert!(plan.prunes.is_empty());
        assert!(plan.salience_updates.is_empty(), "cited episodes do not decay");
    }

    #[test]
    fn test_decay_is_monotonic_and_composes() {
        let p = policy();
        let start = Utc::now();
        let one_step = 1.0 * p.decay_factor(start, start + Duration::days(60));
        let two_steps = 1.0
            * p.decay_factor(start, start + Duration::days(30))
            * p.decay_factor(start + Duration::days(30), start + Duration::days(60));
        assert!((one_step - two_steps).abs() < 1e-9);
        assert!(one_step < 1.0);
    }

    #[test]
    fn test_mid_age_episode_decays_without_pruning() {
        let episodes = BTreeMap::from([(1, episode(1, 1.0, 30))]);
        let plan = policy().plan(&episodes, &BTreeSet::new(), Utc::now());
        assert!(plan.prunes.is_empty());
        assert_eq!(plan.salience_updates.len(), 1);
        let (_, salience) = plan.salience_updates[0];
        assert!((salience - 0.5).abs() < 0.01, "one half-life, got {salience}");
    }

    #[test]
    fn test_low_salience_dies_faster() {
        // Appended with salience already near the floor: prunable after a
        // fraction of the half-life
        let episodes = BTreeMap::from([(1, episode(1, 0.06, 30))]);
        let plan = policy().plan(&episodes, &BTreeSet::new(), Utc::now());
        assert_eq!(plan.prunes, vec![1]);
    }
}
