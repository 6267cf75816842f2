//! Consolidation orchestration ("dream cycle")
//!
//! One run moves through `idle -> running -> committing -> idle`, or aborts
//! back to idle with nothing applied. The run snapshots the store once at
//! entry; everything it mines and mutates is bounded by the watermark range
//! `(prior, snapshot]`, so concurrent appends never race the batch and are
//! simply left for the next run. At most one run is active at a time; a
//! second trigger is reported as a no-op rather than queued.
//!
//! The timer or trigger deciding *when* to consolidate lives in the control
//! loop, not here.

use crate::config::{ConsolidationConfig, ForgettingConfig};
use crate::consolidation::contradiction::{ContradictionResolver, ResolutionStats};
use crate::consolidation::forgetting::ForgettingPolicy;
use crate::consolidation::miner::{MergeStats, ReplayMiner, SkillOutcome};
use crate::error::{Error, Result};
use crate::memory::belief::Belief;
use crate::memory::self_model::SelfModelEntry;
use crate::memory::skill::Skill;
use crate::memory::store::{ConsolidationBatch, MemoryStore};
use crate::provider::{EmbeddingProvider, ExtractionProvider, ProviderResponse};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Observable state of the consolidation state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No run active
    Idle,
    /// Mining and resolving against the entry snapshot
    Running,
    /// Applying the batch to the store
    Committing,
}

/// Summary of one committed consolidation run
#[derive(Debug, Clone, Default)]
pub struct ConsolidationReport {
    /// Watermark before the run
    pub prior_watermark: u64,
    /// Watermark after the commit
    pub watermark: u64,
    /// Episodes mined this run
    pub episodes_processed: usize,
    /// New beliefs inserted
    pub beliefs_created: usize,
    /// Existing beliefs corroborated or otherwise modified
    pub beliefs_updated: usize,
    /// Beliefs disputed after resolution
    pub beliefs_disputed: usize,
    /// Beliefs confirmed after resolution
    pub beliefs_confirmed: usize,
    /// Beliefs retracted as superseded
    pub beliefs_retracted: usize,
    /// Skills whose success rates changed
    pub skills_updated: usize,
    /// Self-model entries recomputed
    pub self_model_updated: usize,
    /// Episode payloads pruned
    pub episodes_pruned: usize,
    /// Tag frequency over the mined window
    pub tag_counts: BTreeMap<String, usize>,
}

/// Result of a consolidation trigger
#[derive(Debug, Clone)]
pub enum ConsolidationOutcome {
    /// The run committed; counts attached
    Completed(ConsolidationReport),
    /// Another run was already active; nothing was done and nothing is
    /// lost, the pending episodes are reconciled by the next run
    AlreadyRunning,
}

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_COMMITTING: u8 = 2;

/// Orchestrates Replay Miner, Contradiction Resolver, and Forgetting Policy
/// into one atomic batch per run
pub struct Consolidator {
    store: Arc<MemoryStore>,
    miner: ReplayMiner,
    resolver: ContradictionResolver,
    forgetting: ForgettingPolicy,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    config: ConsolidationConfig,
    run_state: AtomicU8,
}

impl Consolidator {
    /// Create a consolidator with the deterministic extraction heuristics
    pub fn new(
        store: Arc<MemoryStore>,
        consolidation: ConsolidationConfig,
        forgetting: ForgettingConfig,
    ) -> Self {
        Self {
            store,
            miner: ReplayMiner::new(&consolidation),
            resolver: ContradictionResolver::new(&consolidation),
            forgetting: ForgettingPolicy::new(&forgetting),
            embedder: None,
            config: consolidation,
            run_state: AtomicU8::new(STATE_IDLE),
        }
    }

    /// Attach an extraction provider for candidate phrasing
    pub fn with_extraction_provider(mut self, provider: Arc<dyn ExtractionProvider>) -> Self {
        self.miner = self.miner.with_provider(provider);
        self
    }

    /// Attach an embedding provider for new belief vectors
    pub fn with_embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(provider);
        self
    }

    /// Current state-machine position
    pub fn run_state(&self) -> RunState {
        match self.run_state.load(Ordering::SeqCst) {
            STATE_RUNNING => RunState::Running,
            STATE_COMMITTING => RunState::Committing,
            _ => RunState::Idle,
        }
    }

    /// Trigger one consolidation run.
    ///
    /// Returns `AlreadyRunning` (a no-op, not an error) when a run is
    /// active. On internal failure the batch is discarded, the watermark is
    /// unchanged, and the error is surfaced as `Error::Consolidation`; the
    /// run is safe to retry.
    pub async fn consolidate(&self) -> Result<ConsolidationOutcome> {
        if self
            .run_state
            .compare_exchange(STATE_IDLE, STATE_RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("consolidation trigger ignored, a run is already active");
            return Ok(ConsolidationOutcome::AlreadyRunning);
        }

        let result = self.run().await;
        self.run_state.store(STATE_IDLE, Ordering::SeqCst);

        match result {
            Ok(report) => {
                tracing::info!(
                    watermark = report.watermark,
                    episodes = report.episodes_processed,
                    beliefs_created = report.beliefs_created,
                    beliefs_disputed = report.beliefs_disputed,
                    pruned = report.episodes_pruned,
                    "consolidation committed"
                );
                Ok(ConsolidationOutcome::Completed(report))
            }
            Err(e) => {
                tracing::warn!("consolidation aborted: {e}");
                Err(Error::Consolidation(e.to_string()))
            }
        }
    }

    async fn run(&self) -> Result<ConsolidationReport> {
        let snapshot = self.store.snapshot().await;
        let prior_watermark = snapshot.watermark;

        // Window bounded by the snapshot: ids in (prior, snapshot], capped.
        // Episodes appended after this point belong to the next run.
        let window: Vec<_> = snapshot
            .episodes
            .range(prior_watermark + 1..)
            .take(self.config.batch_size)
            .map(|(_, e)| e.clone())
            .collect();
        let watermark = window.last().map(|e| e.id).unwrap_or(prior_watermark);

        let mined = self.miner.mine(&window).await?;

        // Beliefs: merge candidates, embed the newcomers, resolve conflicts
        let mut beliefs = snapshot.beliefs.clone();
        let merge_stats: MergeStats =
            ReplayMiner::merge_into(&mut beliefs, mined.candidates, self.config.corroboration_gain);
        self.embed_new_beliefs(&mut beliefs, &snapshot.beliefs).await;
        let resolution: ResolutionStats = self.resolver.resolve(&mut beliefs);

        // Skills: fold outcomes, then recompute the self-model from them
        let mut skills = snapshot.skills.clone();
        Self::apply_outcomes(&mut skills, mined.outcomes, self.config.skill_rate_alpha);
        let self_model = Self::recompute_self_model(&skills);

        // Forgetting: only episodes uncited by live beliefs/skills decay
        let cited = Self::cited_episodes(&beliefs, &skills);
        let plan = self.forgetting.plan(&snapshot.episodes, &cited, Utc::now());

        let belief_upserts = diff_upserts(&snapshot.beliefs, beliefs);
        let skill_upserts = diff_upserts(&snapshot.skills, skills);
        let self_model_upserts: Vec<SelfModelEntry> = self_model
            .into_iter()
            .filter(|(capability, entry)| {
                snapshot
                    .self_model
                    .get(capability)
                    .map(|old| {
                        old.reliability_score != entry.reliability_score
                            || old.limitations != entry.limitations
                    })
                    .unwrap_or(true)
            })
            .map(|(_, entry)| entry)
            .collect();

        let report = ConsolidationReport {
            prior_watermark,
            watermark,
            episodes_processed: window.len(),
            beliefs_created: merge_stats.created,
            beliefs_updated: belief_upserts.len().saturating_sub(merge_stats.created),
            beliefs_disputed: resolution.disputed,
            beliefs_confirmed: resolution.confirmed,
            beliefs_retracted: resolution.retracted,
            skills_updated: skill_upserts.len(),
            self_model_updated: self_model_upserts.len(),
            episodes_pruned: plan.prunes.len(),
            tag_counts: mined.tag_counts,
        };

        self.run_state.store(STATE_COMMITTING, Ordering::SeqCst);
        self.store
            .apply_consolidation_batch(ConsolidationBatch {
                watermark,
                belief_upserts,
                skill_upserts,
                self_model_upserts,
                salience_updates: plan.salience_updates,
                prunes: plan.prunes,
            })
            .await?;

        Ok(report)
    }

    /// Embed beliefs that did not exist before this run, when a provider is
    /// attached. Unavailability leaves the embedding empty.
    async fn embed_new_beliefs(
        &self,
        beliefs: &mut BTreeMap<Uuid, Belief>,
        existing: &BTreeMap<Uuid, Belief>,
    ) {
        let Some(embedder) = &self.embedder else {
            return;
        };
        for (id, belief) in beliefs.iter_mut() {
            if existing.contains_key(id) || belief.embedding.is_some() {
                continue;
            }
            if let ProviderResponse::Ready(vector) = embedder.embed(&belief.statement).await {
                belief.embedding = Some(vector);
            }
        }
    }

    /// Fold skill outcomes into the working skill set, creating shells for
    /// skills first seen in this window.
    fn apply_outcomes(skills: &mut BTreeMap<Uuid, Skill>, outcomes: Vec<SkillOutcome>, alpha: f64) {
        for outcome in outcomes {
            let existing = skills.values_mut().find(|s| s.name == outcome.skill);
            match existing {
                Some(skill) => skill.record_outcome(
                    outcome.success,
                    alpha,
                    outcome.episode_id,
                    outcome.at,
                    outcome.failure_mode,
                ),
                None => {
                    let mut skill = Skill::from_first_outcome(
                        outcome.skill,
                        outcome.success,
                        outcome.episode_id,
                        outcome.at,
                    );
                    if let Some(mode) = outcome.failure_mode {
                        skill.failure_modes.insert(mode);
                    }
                    skills.insert(skill.id, skill);
                }
            }
        }
    }

    /// One self-model entry per skill: reliability mirrors the success rate,
    /// limitations mirror the observed failure modes.
    fn recompute_self_model(skills: &BTreeMap<Uuid, Skill>) -> BTreeMap<String, SelfModelEntry> {
        skills
            .values()
            .map(|skill| {
                (
                    skill.name.clone(),
                    SelfModelEntry::from_skill(
                        skill.name.clone(),
                        skill.success_rate,
                        skill.failure_modes.clone(),
                    ),
                )
            })
            .collect()
    }

    /// Evidence ids cited by live beliefs and by skills
    fn cited_episodes(
        beliefs: &BTreeMap<Uuid, Belief>,
        skills: &BTreeMap<Uuid, Skill>,
    ) -> BTreeSet<u64> {
        let mut cited = BTreeSet::new();
        for belief in beliefs.values().filter(|b| b.status.is_live()) {
            cited.extend(belief.evidence.iter().copied());
        }
        for skill in skills.values() {
            cited.extend(skill.evidence.iter().copied());
        }
        cited
    }
}

/// Entries of `working` that differ from (or are missing in) `original`
fn diff_upserts<K: Ord, V: Clone + PartialEq>(
    original: &BTreeMap<K, V>,
    working: BTreeMap<K, V>,
) -> Vec<V> {
    working
        .into_iter()
        .filter(|(key, value)| original.get(key) != Some(value))
        .map(|(_, value)| value)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::belief::BeliefStatus;
    use crate::memory::episode::{EpisodeDraft, EpisodeKind};
    use crate::provider::ExtractedClaim;
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use std::time::Duration;

    fn consolidator(store: Arc<MemoryStore>) -> Consolidator {
        Consolidator::new(
            store,
            ConsolidationConfig::default(),
            ForgettingConfig::default(),
        )
    }

    async fn append(store: &MemoryStore, payload: &str) -> u64 {
        store
            .append_episode(EpisodeDraft::new(EpisodeKind::Observation, payload))
            .await
            .unwrap()
    }

    fn completed(outcome: ConsolidationOutcome) -> ConsolidationReport {
        match outcome {
            ConsolidationOutcome::Completed(report) => report,
            ConsolidationOutcome::AlreadyRunning => panic!("expected a completed run"),
        }
    }

    #[tokio::test]
    async fn test_scenario_preference_becomes_proposed_belief() {
        let store = Arc::new(MemoryStore::in_memory());
        let episode_id = append(&store, "User said: I love lo-fi music").await;

        let c = consolidator(store.clone());
        let report = completed(c.consolidate().await.unwrap());

        assert_eq!(report.beliefs_created, 1);
        assert_eq!(report.watermark, episode_id);

        let beliefs = store.list_beliefs(10).await;
        assert_eq!(beliefs.len(), 1);
        let belief = &beliefs[0];
        assert!(belief.statement.contains("likes lo-fi music"));
        assert!(belief.confidence > 0.0 && belief.confidence < 1.0);
        assert_eq!(belief.status, BeliefStatus::Proposed);
        assert!(belief.evidence.contains(&episode_id));
    }

    #[tokio::test]
    async fn test_scenario_contradiction_disputes_both_sides() {
        let store = Arc::new(MemoryStore::in_memory());
        let c = consolidator(store.clone());

        // Corroborate "likes lo-fi music" until confirmed
        for _ in 0..5 {
            append(&store, "I love lo-fi music").await;
            completed(c.consolidate().await.unwrap());
        }
        let beliefs = store.list_beliefs(10).await;
        assert_eq!(beliefs[0].status, BeliefStatus::Confirmed);
        let confirmed_id = beliefs[0].id;

        // Then the opposite arrives
        append(&store, "User said: I hate lo-fi music").await;
        let report = completed(c.consolidate().await.unwrap());
        assert_eq!(report.beliefs_disputed, 2);

        let beliefs = store.list_beliefs(10).await;
        assert_eq!(beliefs.len(), 2);
        let old = beliefs.iter().find(|b| b.id == confirmed_id).unwrap();
        let new = beliefs.iter().find(|b| b.id != confirmed_id).unwrap();
        assert_eq!(old.status, BeliefStatus::Disputed);
        assert_eq!(new.status, BeliefStatus::Disputed);
        assert!(old.conflicts_with.contains(&new.id));
        assert!(new.conflicts_with.contains(&old.id));
    }

    #[tokio::test]
    async fn test_idempotent_with_no_new_episodes() {
        let store = Arc::new(MemoryStore::in_memory());
        append(&store, "I like green tea").await;

        let c = consolidator(store.clone());
        completed(c.consolidate().await.unwrap());

        let watermark = store.watermark().await;
        let beliefs_before = store.list_beliefs(100).await;
        let skills_before = store.list_skills().await;

        let report = completed(c.consolidate().await.unwrap());
        assert_eq!(report.episodes_processed, 0);
        assert_eq!(store.watermark().await, watermark);
        assert_eq!(store.list_beliefs(100).await, beliefs_before);
        assert_eq!(store.list_skills().await, skills_before);
    }

    #[tokio::test]
    async fn test_watermark_monotonic_across_runs() {
        let store = Arc::new(MemoryStore::in_memory());
        let c = consolidator(store.clone());

        let mut last = store.watermark().await;
        for round in 0..3 {
            append(&store, &format!("observation round {round}")).await;
            completed(c.consolidate().await.unwrap());
            let current = store.watermark().await;
            assert!(current >= last);
            last = current;
        }
    }

    #[tokio::test]
    async fn test_batch_cap_leaves_rest_for_next_run() {
        let store = Arc::new(MemoryStore::in_memory());
        for i in 0..5 {
            append(&store, &format!("observation {i}")).await;
        }

        let mut config = ConsolidationConfig::default();
        config.batch_size = 2;
        let c = Consolidator::new(store.clone(), config, ForgettingConfig::default());

        let first = completed(c.consolidate().await.unwrap());
        assert_eq!(first.episodes_processed, 2);
        assert_eq!(store.watermark().await, 2);

        let second = completed(c.consolidate().await.unwrap());
        assert_eq!(second.episodes_processed, 2);
        let third = completed(c.consolidate().await.unwrap());
        assert_eq!(third.episodes_processed, 1);
        assert_eq!(store.watermark().await, 5);
    }

    #[tokio::test]
    async fn test_skill_outcomes_update_rate_and_self_model() {
        let store = Arc::new(MemoryStore::in_memory());

        let mut ok = Map::new();
        ok.insert("skill".to_string(), Value::String("web_search".to_string()));
        ok.insert("outcome".to_string(), Value::String("success".to_string()));
        store
            .append_episode(
                EpisodeDraft::new(EpisodeKind::Action, "searched the web").structured(ok),
            )
            .await
            .unwrap();

        let mut bad = Map::new();
        bad.insert("skill".to_string(), Value::String("web_search".to_string()));
        bad.insert("outcome".to_string(), Value::String("failure".to_string()));
        bad.insert(
            "failure_mode".to_string(),
            Value::String("rate limited".to_string()),
        );
        store
            .append_episode(
                EpisodeDraft::new(EpisodeKind::Action, "searched again").structured(bad),
            )
            .await
            .unwrap();

        let c = consolidator(store.clone());
        let report = completed(c.consolidate().await.unwrap());
        assert_eq!(report.skills_updated, 1);
        assert_eq!(report.self_model_updated, 1);

        let skill = store.get_skill_by_name("web_search").await.unwrap();
        // First outcome seeds 1.0, the failure folds it down by alpha
        assert!((skill.success_rate - 0.7).abs() < 1e-9);
        assert!(skill.failure_modes.contains("rate limited"));

        let entries = store.list_self_model().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].capability, "web_search");
        assert!((entries[0].reliability_score - skill.success_rate).abs() < 1e-9);
        assert!(entries[0].limitations.contains("rate limited"));
    }

    struct SlowProvider;

    #[async_trait]
    impl ExtractionProvider for SlowProvider {
        async fn extract(
            &self,
            _text: &str,
        ) -> crate::error::Result<ProviderResponse<Vec<ExtractedClaim>>> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(ProviderResponse::Unavailable)
        }
    }

    #[tokio::test]
    async fn test_concurrent_trigger_rejected_as_noop() {
        let store = Arc::new(MemoryStore::in_memory());
        append(&store, "I like slow extractors").await;

        let c = Arc::new(
            consolidator(store.clone()).with_extraction_provider(Arc::new(SlowProvider)),
        );

        let (a, b) = tokio::join!(c.consolidate(), c.consolidate());
        let outcomes = [a.unwrap(), b.unwrap()];

        let completed_count = outcomes
            .iter()
            .filter(|o| matches!(o, ConsolidationOutcome::Completed(_)))
            .count();
        let rejected_count = outcomes
            .iter()
            .filter(|o| matches!(o, ConsolidationOutcome::AlreadyRunning))
            .count();
        assert_eq!(completed_count, 1, "exactly one run commits");
        assert_eq!(rejected_count, 1, "the other is a no-op, not an error");
        assert_eq!(c.run_state(), RunState::Idle);
    }

    struct BrokenProvider;

    #[async_trait]
    impl ExtractionProvider for BrokenProvider {
        async fn extract(
            &self,
            _text: &str,
        ) -> crate::error::Result<ProviderResponse<Vec<ExtractedClaim>>> {
            Err(Error::Consolidation("extractor crashed".to_string()))
        }
    }

    #[tokio::test]
    async fn test_abort_leaves_state_untouched_and_is_retryable() {
        let store = Arc::new(MemoryStore::in_memory());
        append(&store, "I love error handling").await;

        let broken = consolidator(store.clone()).with_extraction_provider(Arc::new(BrokenProvider));
        let result = broken.consolidate().await;
        assert!(matches!(result, Err(Error::Consolidation(_))));
        assert_eq!(store.watermark().await, 0, "watermark unchanged on abort");
        assert!(store.list_beliefs(10).await.is_empty(), "no partial batch");
        assert_eq!(broken.run_state(), RunState::Idle);

        // Retry with a healthy consolidator processes the same window
        let healthy = consolidator(store.clone());
        let report = completed(healthy.consolidate().await.unwrap());
        assert_eq!(report.beliefs_created, 1);
    }

    struct CountingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        async fn embed(&self, text: &str) -> ProviderResponse<Vec<f32>> {
            ProviderResponse::Ready(vec![text.len() as f32])
        }
    }

    #[tokio::test]
    async fn test_new_beliefs_get_embeddings_when_provider_present() {
        let store = Arc::new(MemoryStore::in_memory());
        append(&store, "I like typed embeddings").await;

        let c = consolidator(store.clone()).with_embedding_provider(Arc::new(CountingEmbedder));
        completed(c.consolidate().await.unwrap());

        let beliefs = store.list_beliefs(10).await;
        assert!(beliefs[0].embedding.is_some());
    }

    #[tokio::test]
    async fn test_absent_embedder_still_consolidates() {
        let store = Arc::new(MemoryStore::in_memory());
        append(&store, "I like graceful degradation").await;

        let c = consolidator(store.clone());
        let report = completed(c.consolidate().await.unwrap());
        assert_eq!(report.beliefs_created, 1);
        assert!(store.list_beliefs(10).await[0].embedding.is_none());
    }

    #[tokio::test]
    async fn test_uncited_low_salience_episode_pruned_hash_survives() {
        let store = Arc::new(MemoryStore::in_memory());
        // Below the pruning floor from the start and cited by nothing
        let id = store
            .append_episode(
                EpisodeDraft::new(EpisodeKind::System, "transient noise").salience(0.01),
            )
            .await
            .unwrap();
        let hash = store.get_episode(id).await.unwrap().content_hash.clone();

        let c = consolidator(store.clone());
        let report = completed(c.consolidate().await.unwrap());
        assert_eq!(report.episodes_pruned, 1);

        assert!(store.get_episode(id).await.is_none(), "payload removed");
        let evidence = store.get_evidence(id).await.unwrap();
        assert_eq!(evidence.content_hash(), hash, "provenance survives pruning");
    }

    #[tokio::test]
    async fn test_evidence_cited_episode_survives_forgetting() {
        let store = Arc::new(MemoryStore::in_memory());
        // Low salience, but the mined belief will cite it as evidence
        let id = store
            .append_episode(
                EpisodeDraft::new(EpisodeKind::Observation, "I love tiny episodes")
                    .salience(0.01),
            )
            .await
            .unwrap();

        let c = consolidator(store.clone());
        let first = completed(c.consolidate().await.unwrap());
        assert_eq!(first.beliefs_created, 1);
        assert_eq!(first.episodes_pruned, 0);

        // Repeated forgetting passes still leave the cited episode alone
        for _ in 0..3 {
            let report = completed(c.consolidate().await.unwrap());
            assert_eq!(report.episodes_pruned, 0);
        }
        assert!(store.get_episode(id).await.is_some());
    }

    #[tokio::test]
    async fn test_tag_counts_in_report() {
        let store = Arc::new(MemoryStore::in_memory());
        store
            .append_episode(
                EpisodeDraft::new(EpisodeKind::Observation, "listened to a playlist")
                    .tag("music")
                    .tag("evening"),
            )
            .await
            .unwrap();
        store
            .append_episode(
                EpisodeDraft::new(EpisodeKind::Observation, "queued another album").tag("music"),
            )
            .await
            .unwrap();

        let c = consolidator(store.clone());
        let report = completed(c.consolidate().await.unwrap());
        assert_eq!(report.tag_counts.get("music"), Some(&2));
        assert_eq!(report.tag_counts.get("evening"), Some(&1));
    }
}
