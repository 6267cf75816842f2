//! Memory relations and the durable store
//!
//! Six entity families plus the consolidation watermark: episodes
//! (append-only), beliefs, skills, goals, self-model entries, and
//! hypotheses. The store exclusively owns all entity state.

pub mod belief;
pub mod episode;
pub mod goal;
pub mod hypothesis;
pub mod self_model;
pub mod skill;
pub mod store;

pub use belief::{normalize_subject, Belief, BeliefStatus, Polarity};
pub use episode::{Episode, EpisodeDraft, EpisodeKind, EpisodeTombstone, Evidence, PrivacyLevel};
pub use goal::{Goal, GoalStatus};
pub use hypothesis::{Hypothesis, HypothesisStatus};
pub use self_model::SelfModelEntry;
pub use skill::Skill;
pub use store::{
    ConsolidationBatch, GoalDraft, HypothesisDraft, HypothesisResolution, MemoryStore,
};
