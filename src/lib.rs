//! Engram - Memory-first runtime core for autonomous operators
//!
//! Engram persists what an autonomous operator has done, believes, and can
//! do, and periodically re-derives durable knowledge from transient
//! experience. The control loop streams episodes in; the dream cycle turns
//! them into beliefs and skill updates while detecting contradictions and
//! forgetting stale evidence.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Control loop (external)                │
//! │   append_episode      consolidate       query_memory         │
//! └────────┬───────────────────┬──────────────────┬──────────────┘
//!          │                   │                  │
//!          ▼                   ▼                  ▼
//! ┌────────────────┐  ┌─────────────────┐  ┌──────────────┐
//! │  MemoryStore   │◄─│  Consolidator   │  │  Retriever   │
//! │  episodes      │  │  ReplayMiner    │  │  lexical     │
//! │  beliefs       │  │  Contradiction  │  │  recency     │
//! │  skills        │  │    Resolver     │  │  confidence  │
//! │  goals         │  │  Forgetting     │  │  vector      │
//! │  self-model    │  │    Policy       │  │  goal boost  │
//! │  hypotheses    │  └─────────────────┘  └──────────────┘
//! │  watermark     │   one atomic batch      read-only
//! └────────────────┘   per committed run     snapshots
//! ```
//!
//! The store is the only owner of entity state. The consolidator is the only
//! bulk mutator, and it commits through a single all-or-nothing batch whose
//! watermark advance makes the run durable. The retriever never writes.
//! Optional embedding and extraction providers plug in through the
//! [`provider`] traits and degrade to deterministic fallbacks when absent.
//!
//! ## Modules
//!
//! - [`memory`]: entity types and the durable store
//! - [`consolidation`]: the dream cycle (miner, resolver, forgetting)
//! - [`retrieval`]: hybrid ranked queries
//! - [`provider`]: capability contracts for optional collaborators
//! - [`context`]: bounded session context buffer
//! - [`provenance`]: content hashing and evidence references
//! - [`config`]: policy constants and storage configuration

pub mod config;
pub mod consolidation;
pub mod context;
pub mod error;
pub mod memory;
pub mod provenance;
pub mod provider;
pub mod retrieval;

pub use config::EngramConfig;
pub use consolidation::{ConsolidationOutcome, ConsolidationReport, Consolidator};
pub use error::{Error, Result};
pub use memory::{
    Belief, BeliefStatus, ConsolidationBatch, Episode, EpisodeDraft, EpisodeKind,
    EpisodeTombstone, Evidence, Goal, GoalDraft, GoalStatus, Hypothesis, HypothesisDraft,
    HypothesisResolution, HypothesisStatus, MemoryStore, Polarity, PrivacyLevel, SelfModelEntry,
    Skill,
};
pub use retrieval::{MemoryRef, MemoryType, QueryRequest, RankedHit, Retriever};
