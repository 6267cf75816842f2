//! Durable keyed store for all memory relations
//!
//! The store owns every entity: episodes (append-only), beliefs, skills,
//! goals, self-model entries, hypotheses, episode tombstones, and the
//! consolidation watermark. State lives behind a single `tokio::sync::RwLock`
//! and is optionally persisted as one JSON snapshot under a base directory,
//! written via temp-file + rename so the consolidation batch commit is
//! all-or-nothing:
//!
//! ```text
//! ~/.engram/
//! └── state.json
//! ```
//!
//! Bulk mutation of beliefs, skills, and self-model entries happens only
//! through `apply_consolidation_batch`. Goal and hypothesis updates are
//! control-loop operations touching disjoint state.

use crate::error::{Error, Result};
use crate::memory::belief::Belief;
use crate::memory::episode::{Episode, EpisodeDraft, EpisodeTombstone, Evidence};
use crate::memory::goal::{Goal, GoalStatus};
use crate::memory::hypothesis::{Hypothesis, HypothesisStatus};
use crate::memory::self_model::SelfModelEntry;
use crate::memory::skill::Skill;
use crate::provenance::sha256_text;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

const STATE_FILE: &str = "state.json";

/// All persisted relations plus the watermark, serialized as one snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct StoreState {
    pub next_episode_id: u64,
    pub watermark: u64,
    pub episodes: BTreeMap<u64, Episode>,
    pub tombstones: BTreeMap<u64, EpisodeTombstone>,
    pub beliefs: BTreeMap<Uuid, Belief>,
    pub skills: BTreeMap<Uuid, Skill>,
    pub goals: BTreeMap<Uuid, Goal>,
    pub self_model: BTreeMap<String, SelfModelEntry>,
    pub hypotheses: BTreeMap<Uuid, Hypothesis>,
}

/// The single mutation unit produced by a consolidation run. Applied
/// atomically: every upsert and prune lands and the watermark advances, or
/// nothing changes.
#[derive(Debug, Clone, Default)]
pub struct ConsolidationBatch {
    /// New watermark; must be >= the current one
    pub watermark: u64,
    /// Beliefs created or modified during the run
    pub belief_upserts: Vec<Belief>,
    /// Skills created or modified during the run
    pub skill_upserts: Vec<Skill>,
    /// Self-model entries recomputed from skill history
    pub self_model_upserts: Vec<SelfModelEntry>,
    /// Decayed salience per episode id
    pub salience_updates: Vec<(u64, f64)>,
    /// Episode ids whose payloads are removed (tombstoned)
    pub prunes: Vec<u64>,
}

/// Parameters for registering a hypothesis
#[derive(Debug, Clone)]
pub struct HypothesisDraft {
    pub claim: String,
    pub verification_plan: String,
    pub risk_if_wrong: String,
    pub confidence: f64,
    pub evidence: Vec<u64>,
}

/// How a hypothesis was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HypothesisResolution {
    /// Verified; promoted into a new proposed belief
    Verified,
    /// Rejected; retained for traceability
    Rejected,
}

/// Parameters for creating a goal
#[derive(Debug, Clone)]
pub struct GoalDraft {
    pub description: String,
    pub priority: i32,
    pub subgoals: Vec<String>,
    pub deadline: Option<chrono::DateTime<Utc>>,
}

impl GoalDraft {
    /// Start a draft with the required description and priority
    pub fn new(description: impl Into<String>, priority: i32) -> Self {
        Self {
            description: description.into(),
            priority,
            subgoals: Vec::new(),
            deadline: None,
        }
    }

    /// Add a subgoal
    pub fn subgoal(mut self, subgoal: impl Into<String>) -> Self {
        self.subgoals.push(subgoal.into());
        self
    }

    /// Set a deadline
    pub fn deadline(mut self, deadline: chrono::DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Durable memory store
pub struct MemoryStore {
    state: Arc<RwLock<StoreState>>,
    persist_dir: Option<PathBuf>,
    default_salience: f64,
}

impl MemoryStore {
    /// Create a store with no persistence (state dies with the process)
    pub fn in_memory() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            persist_dir: None,
            default_salience: 1.0,
        }
    }

    /// Open a store persisted under `base_dir`, loading any prior snapshot
    pub async fn open(base_dir: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| Error::Storage(format!("cannot create {}: {e}", base_dir.display())))?;

        let path = base_dir.join(STATE_FILE);
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(data) => serde_json::from_str(&data)
                .map_err(|e| Error::Storage(format!("corrupt state file: {e}")))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(e) => return Err(Error::Storage(format!("cannot read state file: {e}"))),
        };

        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            persist_dir: Some(base_dir),
            default_salience: 1.0,
        })
    }

    /// Override the salience assigned to episodes appended without one
    pub fn with_default_salience(mut self, salience: f64) -> Self {
        self.default_salience = salience;
        self
    }

    /// Default base directory (~/.engram/)
    pub fn default_dir() -> PathBuf {
        crate::config::default_base_dir()
    }

    // =========================================================================
    // Episodes
    // =========================================================================

    /// Append one episode, assigning the next monotonically increasing id.
    ///
    /// Safe to call concurrently with itself and with any read. Fails only
    /// when validation rejects the draft or the storage medium is
    /// unavailable; in the latter case nothing is retained.
    pub async fn append_episode(&self, draft: EpisodeDraft) -> Result<u64> {
        draft.validate()?;

        let mut state = self.state.write().await;
        let id = state.next_episode_id + 1;
        let now = Utc::now();
        let episode = Episode {
            id,
            content_hash: sha256_text(&draft.payload),
            kind: draft.kind,
            payload: draft.payload,
            structured: draft.structured,
            salience: draft.salience.unwrap_or(self.default_salience),
            tags: draft.tags,
            privacy: draft.privacy,
            created_at: now,
            updated_at: now,
        };

        state.next_episode_id = id;
        state.episodes.insert(id, episode);

        if let Err(e) = self.persist(&state).await {
            // The write did not land; undo the staged insert so memory and
            // disk cannot diverge. No retry here, retrying is the caller's
            // decision.
            tracing::warn!("Failed to persist episode {}, rolling back: {}", id, e);
            state.episodes.remove(&id);
            state.next_episode_id = id - 1;
            return Err(e);
        }

        Ok(id)
    }

    /// Fetch one episode by id (live rows only)
    pub async fn get_episode(&self, id: u64) -> Option<Episode> {
        self.state.read().await.episodes.get(&id).cloned()
    }

    /// List the most recent episodes, newest first
    pub async fn list_episodes(&self, limit: usize) -> Vec<Episode> {
        self.state
            .read()
            .await
            .episodes
            .values()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Resolve an evidence citation: live episode or tombstone. The content
    /// hash is retrievable either way.
    pub async fn get_evidence(&self, episode_id: u64) -> Option<Evidence> {
        let state = self.state.read().await;
        if let Some(episode) = state.episodes.get(&episode_id) {
            return Some(Evidence::Live(episode.clone()));
        }
        state
            .tombstones
            .get(&episode_id)
            .map(|t| Evidence::Pruned(t.clone()))
    }

    // =========================================================================
    // Beliefs / skills / self-model (read side; writes go through the batch)
    // =========================================================================

    /// Fetch one belief by id, any status
    pub async fn get_belief(&self, id: &Uuid) -> Option<Belief> {
        self.state.read().await.beliefs.get(id).cloned()
    }

    /// List beliefs, most recently updated first. Disputed beliefs are
    /// included; retraction does not remove a belief from this listing.
    pub async fn list_beliefs(&self, limit: usize) -> Vec<Belief> {
        let state = self.state.read().await;
        let mut beliefs: Vec<Belief> = state.beliefs.values().cloned().collect();
        beliefs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
        beliefs.truncate(limit);
        beliefs
    }

    /// Fetch one skill by id
    pub async fn get_skill(&self, id: &Uuid) -> Option<Skill> {
        self.state.read().await.skills.get(id).cloned()
    }

    /// Fetch one skill by name
    pub async fn get_skill_by_name(&self, name: &str) -> Option<Skill> {
        self.state
            .read()
            .await
            .skills
            .values()
            .find(|s| s.name == name)
            .cloned()
    }

    /// List all skills
    pub async fn list_skills(&self) -> Vec<Skill> {
        self.state.read().await.skills.values().cloned().collect()
    }

    /// List all self-model entries
    pub async fn list_self_model(&self) -> Vec<SelfModelEntry> {
        self.state.read().await.self_model.values().cloned().collect()
    }

    // =========================================================================
    // Goals (control-loop owned)
    // =========================================================================

    /// Create a goal
    pub async fn create_goal(&self, draft: GoalDraft) -> Result<Goal> {
        if draft.description.trim().is_empty() {
            return Err(Error::Validation("goal description is empty".to_string()));
        }

        let mut goal = Goal::new(draft.description, draft.priority);
        goal.subgoals = draft.subgoals;
        goal.deadline = draft.deadline;

        let mut state = self.state.write().await;
        state.goals.insert(goal.id, goal.clone());
        if let Err(e) = self.persist(&state).await {
            state.goals.remove(&goal.id);
            return Err(e);
        }
        Ok(goal)
    }

    /// Fetch one goal by id
    pub async fn get_goal(&self, id: &Uuid) -> Option<Goal> {
        self.state.read().await.goals.get(id).cloned()
    }

    /// List all goals
    pub async fn list_goals(&self) -> Vec<Goal> {
        self.state.read().await.goals.values().cloned().collect()
    }

    /// Update a goal's progress. Rejected for terminal goals.
    pub async fn update_goal_progress(&self, id: &Uuid, progress: f64) -> Result<Goal> {
        if !(0.0..=1.0).contains(&progress) || !progress.is_finite() {
            return Err(Error::Validation(format!(
                "goal progress must be within [0, 1], got {progress}"
            )));
        }

        let mut state = self.state.write().await;
        let previous = {
            let goal = state
                .goals
                .get_mut(id)
                .ok_or_else(|| Error::Validation(format!("unknown goal {id}")))?;
            if goal.status.is_terminal() {
                return Err(Error::Validation(format!(
                    "goal {id} is terminal ({:?}), no further updates accepted",
                    goal.status
                )));
            }
            let previous = goal.clone();
            goal.progress = progress;
            goal.updated_at = Utc::now();
            previous
        };

        if let Err(e) = self.persist(&state).await {
            state.goals.insert(*id, previous);
            return Err(e);
        }
        Ok(state.goals[id].clone())
    }

    /// Change a goal's status. Transitions out of a terminal status are
    /// rejected.
    pub async fn set_goal_status(&self, id: &Uuid, status: GoalStatus) -> Result<Goal> {
        let mut state = self.state.write().await;
        let previous = {
            let goal = state
                .goals
                .get_mut(id)
                .ok_or_else(|| Error::Validation(format!("unknown goal {id}")))?;
            if goal.status.is_terminal() {
                return Err(Error::Validation(format!(
                    "goal {id} is terminal ({:?}), no further updates accepted",
                    goal.status
                )));
            }
            let previous = goal.clone();
            goal.status = status;
            goal.updated_at = Utc::now();
            previous
        };

        if let Err(e) = self.persist(&state).await {
            state.goals.insert(*id, previous);
            return Err(e);
        }
        Ok(state.goals[id].clone())
    }

    // =========================================================================
    // Hypotheses
    // =========================================================================

    /// Register an open hypothesis
    pub async fn register_hypothesis(&self, draft: HypothesisDraft) -> Result<Hypothesis> {
        if draft.claim.trim().is_empty() {
            return Err(Error::Validation("hypothesis claim is empty".to_string()));
        }
        if !(0.0..=1.0).contains(&draft.confidence) || !draft.confidence.is_finite() {
            return Err(Error::Validation(format!(
                "hypothesis confidence must be within [0, 1], got {}",
                draft.confidence
            )));
        }

        let now = Utc::now();
        let hypothesis = Hypothesis {
            id: Uuid::new_v4(),
            claim: draft.claim,
            verification_plan: draft.verification_plan,
            risk_if_wrong: draft.risk_if_wrong,
            evidence: draft.evidence.into_iter().collect(),
            confidence: draft.confidence,
            status: HypothesisStatus::Open,
            created_at: now,
            updated_at: now,
        };

        let mut state = self.state.write().await;
        state.hypotheses.insert(hypothesis.id, hypothesis.clone());
        if let Err(e) = self.persist(&state).await {
            state.hypotheses.remove(&hypothesis.id);
            return Err(e);
        }
        Ok(hypothesis)
    }

    /// Fetch one hypothesis by id
    pub async fn get_hypothesis(&self, id: &Uuid) -> Option<Hypothesis> {
        self.state.read().await.hypotheses.get(id).cloned()
    }

    /// List all hypotheses (rejected ones are retained)
    pub async fn list_hypotheses(&self) -> Vec<Hypothesis> {
        self.state.read().await.hypotheses.values().cloned().collect()
    }

    /// Settle an open hypothesis. A verified hypothesis is promoted into a
    /// new proposed belief carrying the hypothesis evidence; the promoted
    /// belief id is returned. Rejected hypotheses are retained.
    pub async fn resolve_hypothesis(
        &self,
        id: &Uuid,
        resolution: HypothesisResolution,
    ) -> Result<Option<Uuid>> {
        let mut state = self.state.write().await;
        let rollback = state.clone();

        let hypothesis = state
            .hypotheses
            .get_mut(id)
            .ok_or_else(|| Error::Validation(format!("unknown hypothesis {id}")))?;
        if hypothesis.status != HypothesisStatus::Open {
            return Err(Error::Validation(format!(
                "hypothesis {id} already settled ({:?})",
                hypothesis.status
            )));
        }

        let now = Utc::now();
        hypothesis.updated_at = now;
        let promoted = match resolution {
            HypothesisResolution::Rejected => {
                hypothesis.status = HypothesisStatus::Rejected;
                None
            }
            HypothesisResolution::Verified => {
                hypothesis.status = HypothesisStatus::Verified;
                let claim = hypothesis.claim.clone();
                let confidence = hypothesis.confidence;
                let evidence = hypothesis.evidence.clone();

                let mut belief = Belief::proposed(
                    claim.clone(),
                    crate::memory::belief::normalize_subject(&claim),
                    None,
                    confidence,
                    0,
                    true,
                );
                belief.evidence = evidence;
                let belief_id = belief.id;
                state.beliefs.insert(belief_id, belief);
                Some(belief_id)
            }
        };

        if let Err(e) = self.persist(&state).await {
            *state = rollback;
            return Err(e);
        }
        Ok(promoted)
    }

    // =========================================================================
    // Consolidation
    // =========================================================================

    /// Current watermark: highest episode id already processed by a
    /// committed consolidation run.
    pub async fn watermark(&self) -> u64 {
        self.state.read().await.watermark
    }

    /// Apply one consolidation batch atomically.
    ///
    /// Validates the batch, applies it to a copy of the state, persists the
    /// copy, and only then swaps it in. Any failure leaves the store exactly
    /// as it was. This is the sole bulk-mutation path.
    pub async fn apply_consolidation_batch(&self, batch: ConsolidationBatch) -> Result<()> {
        let mut state = self.state.write().await;

        if batch.watermark < state.watermark {
            return Err(Error::Validation(format!(
                "watermark would regress: {} -> {}",
                state.watermark, batch.watermark
            )));
        }
        for belief in &batch.belief_upserts {
            if !belief.confidence.is_finite() || !(0.0..=1.0).contains(&belief.confidence) {
                return Err(Error::Validation(format!(
                    "belief {} confidence out of range: {}",
                    belief.id, belief.confidence
                )));
            }
        }
        for skill in &batch.skill_upserts {
            if !skill.success_rate.is_finite() || !(0.0..=1.0).contains(&skill.success_rate) {
                return Err(Error::Validation(format!(
                    "skill {} success_rate out of range: {}",
                    skill.id, skill.success_rate
                )));
            }
        }
        for (id, salience) in &batch.salience_updates {
            if !salience.is_finite() || *salience < 0.0 {
                return Err(Error::Validation(format!(
                    "episode {id} salience out of range: {salience}"
                )));
            }
        }

        let mut next = state.clone();
        next.watermark = batch.watermark;

        for belief in batch.belief_upserts {
            next.beliefs.insert(belief.id, belief);
        }
        Self::enforce_conflict_symmetry(&mut next.beliefs);

        for skill in batch.skill_upserts {
            next.skills.insert(skill.id, skill);
        }
        for entry in batch.self_model_upserts {
            next.self_model.insert(entry.capability.clone(), entry);
        }

        let now = Utc::now();
        for (id, salience) in batch.salience_updates {
            if let Some(episode) = next.episodes.get_mut(&id) {
                episode.salience = salience;
                episode.updated_at = now;
            }
        }
        for id in batch.prunes {
            if let Some(episode) = next.episodes.remove(&id) {
                next.tombstones.insert(
                    id,
                    EpisodeTombstone {
                        episode_id: id,
                        content_hash: episode.content_hash,
                        created_at: episode.created_at,
                        pruned_at: now,
                    },
                );
            }
        }

        tracing::debug!(
            watermark = next.watermark,
            beliefs = next.beliefs.len(),
            skills = next.skills.len(),
            pruned = next.tombstones.len(),
            "committing consolidation batch"
        );
        self.persist(&next).await?;
        *state = next;
        Ok(())
    }

    /// Make conflict links symmetric and drop links to unknown beliefs.
    /// Re-adding an existing link is a no-op.
    fn enforce_conflict_symmetry(beliefs: &mut BTreeMap<Uuid, Belief>) {
        let known: Vec<Uuid> = beliefs.keys().copied().collect();
        let mut reverse: Vec<(Uuid, Uuid)> = Vec::new();

        for id in &known {
            let belief = beliefs.get_mut(id).expect("key from same map");
            belief.conflicts_with.retain(|other| known.contains(other));
            for other in &belief.conflicts_with {
                reverse.push((*other, *id));
            }
        }
        for (owner, link) in reverse {
            if let Some(belief) = beliefs.get_mut(&owner) {
                belief.conflicts_with.insert(link);
            }
        }
    }

    /// Full-state snapshot for the retriever and the consolidator
    pub(crate) async fn snapshot(&self) -> StoreState {
        self.state.read().await.clone()
    }

    /// Persist the given state when a directory is configured. The snapshot
    /// is written to a temp file and renamed into place.
    async fn persist(&self, state: &StoreState) -> Result<()> {
        let Some(dir) = &self.persist_dir else {
            return Ok(());
        };

        let json = serde_json::to_string_pretty(state)?;
        let tmp = dir.join(format!("{STATE_FILE}.tmp"));
        let path = dir.join(STATE_FILE);

        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| Error::Storage(format!("cannot write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::Storage(format!("cannot commit {}: {e}", path.display())))?;
        Ok(())
    }
}
