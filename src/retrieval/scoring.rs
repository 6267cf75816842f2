//! Scoring signals for hybrid retrieval
//!
//! Each signal is normalized to [0, 1]. The final score is a weighted sum;
//! when the vector signal is absent (no query vector or no candidate
//! embedding) its weight is dropped and the remaining weights are
//! renormalized, so running without an embedding provider never biases the
//! ranking toward zero.

use crate::config::RetrievalConfig;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Token-set overlap between a query and a candidate text: the fraction of
/// query tokens present in the text.
pub fn lexical_overlap(query: &str, text: &str) -> f64 {
    let query_tokens = tokenize(query);
    let text_tokens = tokenize(text);
    if query_tokens.is_empty() || text_tokens.is_empty() {
        return 0.0;
    }
    let shared = query_tokens.intersection(&text_tokens).count();
    shared as f64 / query_tokens.len() as f64
}

/// Map age since last update to [0, 1], falling linearly to zero at the
/// horizon. Monotonically decreasing with age.
pub fn recency_score(updated_at: DateTime<Utc>, now: DateTime<Utc>, horizon_days: f64) -> f64 {
    let age_days = (now - updated_at).num_seconds().max(0) as f64 / 86_400.0;
    (1.0 - age_days / horizon_days.max(f64::MIN_POSITIVE)).clamp(0.0, 1.0)
}

/// Cosine similarity between two vectors, mapped to [0, 1].
/// Zero-magnitude or mismatched vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let cosine = dot / (norm_a.sqrt() * norm_b.sqrt());
    ((cosine + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Per-candidate signal values. `vector` is `None` when either side lacks
/// an embedding.
#[derive(Debug, Clone, Copy)]
pub struct Signals {
    pub lexical: f64,
    pub recency: f64,
    pub confidence: f64,
    pub vector: Option<f64>,
    pub goal: f64,
}

/// Combine signals into one score using the configured weights.
///
/// The four base signals are weight-averaged (renormalizing when the vector
/// term is absent); goal relevance is then added as a bounded boost.
pub fn combine(signals: &Signals, weights: &RetrievalConfig) -> f64 {
    let mut weighted = signals.lexical * weights.lexical_weight
        + signals.recency * weights.recency_weight
        + signals.confidence * weights.confidence_weight;
    let mut total = weights.lexical_weight + weights.recency_weight + weights.confidence_weight;

    if let Some(vector) = signals.vector {
        weighted += vector * weights.vector_weight;
        total += weights.vector_weight;
    }

    let base = if total > 0.0 { weighted / total } else { 0.0 };
    base + signals.goal * weights.goal_weight
}

fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}
