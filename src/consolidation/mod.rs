//! The consolidation engine ("dream cycle")
//!
//! Converts raw episodes into revised beliefs and skill updates, detects and
//! resolves contradictions, and forgets stale evidence — one atomic batch per
//! run, with the watermark advancing only on commit.

pub mod consolidator;
pub mod contradiction;
pub mod forgetting;
pub mod miner;

pub use consolidator::{ConsolidationOutcome, ConsolidationReport, Consolidator, RunState};
pub use contradiction::{ContradictionResolver, ResolutionStats};
pub use forgetting::{ForgettingPlan, ForgettingPolicy};
pub use miner::{BeliefCandidate, MinedWindow, ReplayMiner, SkillOutcome};
