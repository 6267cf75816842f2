//! Hypothesis (uncertainty ledger) data types
//!
//! Hypotheses are registered by the control loop when the operator is unsure
//! about something worth verifying. A verified hypothesis may be promoted
//! into a Belief; a rejected one is retained for traceability.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Hypothesis lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisStatus {
    /// Awaiting verification
    Open,
    /// Verification succeeded; eligible for belief promotion
    Verified,
    /// Verification failed; kept, never deleted
    Rejected,
}

/// An open question tracked with a verification plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    /// Unique hypothesis identifier
    pub id: Uuid,
    /// The claim under question
    pub claim: String,
    /// What observation would settle it
    pub verification_plan: String,
    /// Consequence of acting on a wrong claim
    pub risk_if_wrong: String,
    /// Ids of episodes bearing on the claim
    pub evidence: BTreeSet<u64>,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Lifecycle status
    pub status: HypothesisStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}
