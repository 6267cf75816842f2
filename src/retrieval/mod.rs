//! Hybrid retrieval over the memory store
//!
//! Stateless scoring of candidates against a query context: lexical overlap,
//! recency, confidence, optional vector similarity, and an active-goal boost.

pub mod retriever;
pub mod scoring;

pub use retriever::{MemoryRef, MemoryType, QueryRequest, RankedHit, Retriever};
