//! Hybrid memory retrieval
//!
//! Ranks store entities against a query context using the weighted signals in
//! [`super::scoring`]. The retriever reads a point-in-time snapshot and never
//! writes, so it is safe to call concurrently with appends and with a running
//! consolidation.

use crate::config::RetrievalConfig;
use crate::memory::store::MemoryStore;
use crate::retrieval::scoring::{combine, cosine_similarity, lexical_overlap, recency_score, Signals};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// Entity families a query can select
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Episode,
    Belief,
    Skill,
    Goal,
    Hypothesis,
}

/// Identifier-only reference to a ranked entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryRef {
    Episode(u64),
    Belief(Uuid),
    Skill(Uuid),
    Goal(Uuid),
    Hypothesis(Uuid),
}

impl MemoryRef {
    /// Deterministic ordering key: entity family, then identifier.
    fn sort_key(&self) -> (u8, u128) {
        match self {
            MemoryRef::Episode(id) => (0, u128::from(*id)),
            MemoryRef::Belief(id) => (1, id.as_u128()),
            MemoryRef::Skill(id) => (2, id.as_u128()),
            MemoryRef::Goal(id) => (3, id.as_u128()),
            MemoryRef::Hypothesis(id) => (4, id.as_u128()),
        }
    }
}

/// A query over the memory store
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// Free-text query
    pub text: String,
    /// Optional query embedding
    pub vector: Option<Vec<f32>>,
    /// Goal whose topical neighborhood should be boosted
    pub active_goal: Option<Uuid>,
    /// Entity families to consider; `None` means all
    pub types: Option<BTreeSet<MemoryType>>,
    /// Maximum results; `None` uses the configured default
    pub top_k: Option<usize>,
}

impl QueryRequest {
    /// Start a query with free text
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            vector: None,
            active_goal: None,
            types: None,
            top_k: None,
        }
    }

    /// Attach a query embedding
    pub fn vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }

    /// Boost candidates topically linked to this goal
    pub fn active_goal(mut self, goal_id: Uuid) -> Self {
        self.active_goal = Some(goal_id);
        self
    }

    /// Restrict to the given entity families
    pub fn types(mut self, types: impl IntoIterator<Item = MemoryType>) -> Self {
        self.types = Some(types.into_iter().collect());
        self
    }

    /// Cap the result count
    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }
}

/// One ranked result
#[derive(Debug, Clone)]
pub struct RankedHit {
    /// Reference to the matched entity
    pub entity: MemoryRef,
    /// The entity's textual representation used for matching
    pub text: String,
    /// Combined retrieval score
    pub score: f64,
    /// The entity's last-update timestamp (tie-break key)
    pub updated_at: DateTime<Utc>,
}

/// Stateless hybrid scorer over store snapshots
pub struct Retriever {
    store: Arc<MemoryStore>,
    config: RetrievalConfig,
}

impl Retriever {
    /// Create a retriever over the given store
    pub fn new(store: Arc<MemoryStore>, config: RetrievalConfig) -> Self {
        Self { store, config }
    }

    /// Rank candidate entities against the query context.
    ///
    /// Ties break by newer `updated_at`, then by lower identifier.
    pub async fn query(&self, request: &QueryRequest) -> Vec<RankedHit> {
        let state = self.store.snapshot().await;
        let now = Utc::now();
        let top_k = request.top_k.unwrap_or(self.config.default_top_k);

        let goal_text = request
            .active_goal
            .and_then(|id| state.goals.get(&id))
            .map(|g| g.description.clone());

        let wants = |t: MemoryType| request.types.as_ref().map(|set| set.contains(&t)).unwrap_or(true);
        let mut hits: Vec<RankedHit> = Vec::new();

        if wants(MemoryType::Episode) {
            for episode in state.episodes.values() {
                hits.push(self.score_candidate(
                    MemoryRef::Episode(episode.id),
                    &episode.payload,
                    1.0,
                    None,
                    episode.updated_at,
                    request,
                    goal_text.as_deref(),
                    now,
                ));
            }
        }
        if wants(MemoryType::Belief) {
            for belief in state.beliefs.values().filter(|b| b.status.is_live()) {
                hits.push(self.score_candidate(
                    MemoryRef::Belief(belief.id),
                    &belief.statement,
                    belief.confidence,
                    belief.embedding.as_deref(),
                    belief.updated_at,
                    request,
                    goal_text.as_deref(),
                    now,
                ));
            }
        }
        if wants(MemoryType::Skill) {
            for skill in state.skills.values() {
                let text = if skill.preconditions.is_empty() {
                    skill.name.clone()
                } else {
                    format!("{} {}", skill.name, skill.preconditions)
                };
                hits.push(self.score_candidate(
                    MemoryRef::Skill(skill.id),
                    &text,
                    skill.success_rate,
                    None,
                    skill.updated_at,
                    request,
                    goal_text.as_deref(),
                    now,
                ));
            }
        }
        if wants(MemoryType::Goal) {
            for goal in state.goals.values() {
                hits.push(self.score_candidate(
                    MemoryRef::Goal(goal.id),
                    &goal.description,
                    1.0,
                    None,
                    goal.updated_at,
                    request,
                    goal_text.as_deref(),
                    now,
                ));
            }
        }
        if wants(MemoryType::Hypothesis) {
            for hypothesis in state.hypotheses.values() {
                hits.push(self.score_candidate(
                    MemoryRef::Hypothesis(hypothesis.id),
                    &hypothesis.claim,
                    hypothesis.confidence,
                    None,
                    hypothesis.updated_at,
                    request,
                    goal_text.as_deref(),
                    now,
                ));
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.updated_at.cmp(&a.updated_at))
                .then_with(|| a.entity.sort_key().cmp(&b.entity.sort_key()))
        });
        hits.truncate(top_k);
        hits
    }

    #[allow(clippy::too_many_arguments)]
    fn score_candidate(
        &self,
        entity: MemoryRef,
        text: &str,
        confidence: f64,
        embedding: Option<&[f32]>,
        updated_at: DateTime<Utc>,
        request: &QueryRequest,
        goal_text: Option<&str>,
        now: DateTime<Utc>,
    ) -> RankedHit {
        let vector = match (request.vector.as_deref(), embedding) {
            (Some(query), Some(candidate)) => Some(cosine_similarity(query, candidate)),
            _ => None,
        };
        let signals = Signals {
            lexical: lexical_overlap(&request.text, text),
            recency: recency_score(updated_at, now, self.config.recency_horizon_days),
            confidence: confidence.clamp(0.0, 1.0),
            vector,
            goal: goal_text.map(|g| lexical_overlap(g, text)).unwrap_or(0.0),
        };
        RankedHit {
            entity,
            text: text.to_string(),
            score: combine(&signals, &self.config),
            updated_at,
        }
    }
}
