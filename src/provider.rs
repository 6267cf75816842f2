//! Capability contracts for optional external providers
//!
//! The memory core consults two kinds of collaborators it does not implement:
//! an embedding provider (vector similarity for retrieval) and an extraction
//! provider (phrasing candidate beliefs from raw episode text). Both are
//! modeled as narrow traits whose responses carry an explicit `Unavailable`
//! variant, so the Retriever and the Replay Miner degrade deterministically
//! instead of branching on provider type. Absence of a provider never changes
//! the set of supported operations.

use crate::error::Result;
use crate::memory::belief::Polarity;
use async_trait::async_trait;

/// Outcome of a provider call: either a value or a declared absence.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderResponse<T> {
    /// The provider produced a value.
    Ready(T),
    /// The provider is not available right now; the caller falls back.
    Unavailable,
}

/// Optional embedding capability: `embed(text) -> vector | unavailable`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> ProviderResponse<Vec<f32>>;
}

/// A candidate claim phrased by an extraction provider.
#[derive(Debug, Clone)]
pub struct ExtractedClaim {
    /// Full statement, e.g. "User likely likes lo-fi music"
    pub statement: String,
    /// Normalized subject the claim is about, e.g. "lo-fi music"
    pub subject: String,
    /// Asserted polarity toward the subject, when the claim has one
    pub polarity: Option<Polarity>,
    /// Extraction confidence in [0, 1]
    pub confidence: f64,
}

/// Optional extraction capability used by the Replay Miner.
///
/// Returning `Unavailable` makes the miner fall back to its deterministic
/// heuristics; returning `Err` aborts the consolidation run.
#[async_trait]
pub trait ExtractionProvider: Send + Sync {
    async fn extract(&self, text: &str) -> Result<ProviderResponse<Vec<ExtractedClaim>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, text: &str) -> ProviderResponse<Vec<f32>> {
            if text.is_empty() {
                ProviderResponse::Unavailable
            } else {
                ProviderResponse::Ready(vec![text.len() as f32, 1.0])
            }
        }
    }

    #[tokio::test]
    async fn test_embedding_provider_contract() {
        let provider = FixedEmbedder;
        match provider.embed("hello").await {
            ProviderResponse::Ready(v) => assert_eq!(v.len(), 2),
            ProviderResponse::Unavailable => panic!("expected a vector"),
        }
        assert_eq!(provider.embed("").await, ProviderResponse::Unavailable);
    }
}
