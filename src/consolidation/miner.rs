//! Replay mining: episodes into candidate belief and skill updates
//!
//! The miner walks a bounded window of unconsolidated episodes and proposes
//! zero or more belief candidates and skill outcomes per episode. Extraction
//! is pluggable: when an [`ExtractionProvider`] is configured it phrases the
//! candidates; when it is absent or reports unavailable, a deterministic set
//! of preference patterns takes over so consolidation still produces output
//! offline. Every candidate carries its originating episode id as evidence.

use crate::config::ConsolidationConfig;
use crate::error::Result;
use crate::memory::belief::{normalize_subject, Belief, Polarity};
use crate::memory::episode::Episode;
use crate::provider::{ExtractionProvider, ProviderResponse};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// A candidate belief mined from one episode
#[derive(Debug, Clone)]
pub struct BeliefCandidate {
    /// Normalized subject key used for merging and conflict detection
    pub subject: String,
    /// Asserted polarity, when the claim has one
    pub polarity: Option<Polarity>,
    /// Full statement
    pub statement: String,
    /// Extraction confidence; < 1.0 unless the episode is verified
    pub confidence: f64,
    /// Originating episode (evidence)
    pub episode_id: u64,
    /// Episode payload was marked verified ground truth
    pub verified: bool,
}

/// A skill outcome observed in one episode
#[derive(Debug, Clone)]
pub struct SkillOutcome {
    /// Skill name the episode references
    pub skill: String,
    /// Whether the attempt succeeded
    pub success: bool,
    /// Failure mode reported alongside a failed attempt
    pub failure_mode: Option<String>,
    /// Originating episode (evidence)
    pub episode_id: u64,
    /// Episode timestamp
    pub at: DateTime<Utc>,
}

/// Everything extracted from one mining window
#[derive(Debug, Clone, Default)]
pub struct MinedWindow {
    /// Candidate belief statements
    pub candidates: Vec<BeliefCandidate>,
    /// Skill outcome updates
    pub outcomes: Vec<SkillOutcome>,
    /// Tag frequency over the window
    pub tag_counts: BTreeMap<String, usize>,
}

/// How candidates changed the working belief set
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeStats {
    /// New beliefs inserted
    pub created: usize,
    /// Existing beliefs corroborated
    pub corroborated: usize,
}

/// Extracts candidate memory updates from unconsolidated episodes
pub struct ReplayMiner {
    provider: Option<Arc<dyn ExtractionProvider>>,
    patterns: Vec<(Regex, Polarity)>,
    extraction_confidence: f64,
}

impl ReplayMiner {
    /// Create a miner with the deterministic heuristics only
    pub fn new(config: &ConsolidationConfig) -> Self {
        Self {
            provider: None,
            patterns: preference_patterns(),
            extraction_confidence: config.extraction_confidence,
        }
    }

    /// Attach an extraction provider; heuristics remain the fallback
    pub fn with_provider(mut self, provider: Arc<dyn ExtractionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Mine the window, episodes ordered by id ascending.
    ///
    /// A provider error aborts the run; provider unavailability falls back
    /// to the heuristics.
    pub async fn mine(&self, episodes: &[Episode]) -> Result<MinedWindow> {
        let mut window = MinedWindow::default();

        for episode in episodes {
            for tag in &episode.tags {
                *window.tag_counts.entry(tag.clone()).or_insert(0) += 1;
            }
            window.outcomes.extend(self.skill_outcome(episode));

            let claims = match &self.provider {
                Some(provider) => match provider.extract(&episode.payload).await? {
                    ProviderResponse::Ready(claims) => claims
                        .into_iter()
                        .map(|c| BeliefCandidate {
                            subject: normalize_subject(&c.subject),
                            polarity: c.polarity,
                            statement: c.statement,
                            confidence: c.confidence.clamp(0.0, 1.0),
                            episode_id: episode.id,
                            verified: episode.is_verified(),
                        })
                        .collect(),
                    ProviderResponse::Unavailable => self.heuristic_candidates(episode),
                },
                None => self.heuristic_candidates(episode),
            };
            window.candidates.extend(claims);
        }

        Ok(window)
    }

    /// Merge candidates into a working belief set. A candidate matching an
    /// existing live belief's (subject, polarity) corroborates it; otherwise
    /// a new proposed belief is inserted. Within-window duplicates merge the
    /// same way instead of inserting twice.
    pub fn merge_into(
        beliefs: &mut BTreeMap<Uuid, Belief>,
        candidates: Vec<BeliefCandidate>,
        gain: f64,
    ) -> MergeStats {
        let mut stats = MergeStats::default();

        for candidate in candidates {
            let existing = beliefs
                .values_mut()
                .filter(|b| b.status.is_live())
                .find(|b| b.subject == candidate.subject && b.polarity == candidate.polarity);

            match existing {
                Some(belief) => {
                    belief.corroborate(gain, candidate.episode_id);
                    stats.corroborated += 1;
                }
                None => {
                    let belief = Belief::proposed(
                        candidate.statement,
                        candidate.subject,
                        candidate.polarity,
                        candidate.confidence,
                        candidate.episode_id,
                        candidate.verified,
                    );
                    beliefs.insert(belief.id, belief);
                    stats.created += 1;
                }
            }
        }
        stats
    }

    /// Deterministic preference extraction over the episode payload
    fn heuristic_candidates(&self, episode: &Episode) -> Vec<BeliefCandidate> {
        let verified = episode.is_verified();
        let confidence = if verified {
            1.0
        } else {
            self.extraction_confidence
        };

        let mut candidates = Vec::new();
        for (pattern, polarity) in &self.patterns {
            let Some(captures) = pattern.captures(&episode.payload) else {
                continue;
            };
            let Some(topic) = captures.get(1) else {
                continue;
            };
            let subject = normalize_subject(topic.as_str());
            if subject.is_empty() {
                continue;
            }
            let verb = match polarity {
                Polarity::Positive => "likes",
                Polarity::Negative => "dislikes",
            };
            candidates.push(BeliefCandidate {
                statement: format!("User likely {verb} {subject}"),
                subject,
                polarity: Some(*polarity),
                confidence,
                episode_id: episode.id,
                verified,
            });
        }
        candidates
    }

    /// Structured skill-outcome extraction: episodes carrying `skill` and
    /// `outcome` fields feed procedural memory.
    fn skill_outcome(&self, episode: &Episode) -> Option<SkillOutcome> {
        let skill = episode.structured_str("skill")?.trim();
        if skill.is_empty() {
            return None;
        }
        let success = match episode.structured_str("outcome")? {
            "success" => true,
            "failure" => false,
            _ => return None,
        };
        Some(SkillOutcome {
            skill: skill.to_string(),
            success,
            failure_mode: episode
                .structured_str("failure_mode")
                .map(|m| m.to_string()),
            episode_id: episode.id,
            at: episode.created_at,
        })
    }
}

fn preference_patterns() -> Vec<(Regex, Polarity)> {
    let rules: [(&str, Polarity); 6] = [
        (r"(?i)\bi\s+love\s+([a-z0-9\- ]+?)(?:\band\b|[.,;!]|$)", Polarity::Positive),
        (r"(?i)\bi\s+like\s+([a-z0-9\- ]+?)(?:\band\b|[.,;!]|$)", Polarity::Positive),
        (r"(?i)\bi\s+prefer\s+([a-z0-9\- ]+?)(?:\band\b|[.,;!]|$)", Polarity::Positive),
        (r"(?i)\bi\s+dislike\s+([a-z0-9\- ]+?)(?:\band\b|[.,;!]|$)", Polarity::Negative),
        (r"(?i)\bi\s+hate\s+([a-z0-9\- ]+?)(?:\band\b|[.,;!]|$)", Polarity::Negative),
        (
            r"(?i)\bi\s+(?:don't|do\s+not)\s+like\s+([a-z0-9\- ]+?)(?:\band\b|[.,;!]|$)",
            Polarity::Negative,
        ),
    ];
    rules
        .into_iter()
        .map(|(pattern, polarity)| {
            (Regex::new(pattern).expect("static pattern compiles"), polarity)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::memory::episode::{EpisodeKind, PrivacyLevel};
    use crate::provider::ExtractedClaim;
    use async_trait::async_trait;
    use serde_json::{Map, Value};

    fn episode(id: u64, payload: &str) -> Episode {
        Episode {
            id,
            kind: EpisodeKind::Observation,
            payload: payload.to_string(),
            structured: None,
            salience: 1.0,
            content_hash: String::new(),
            tags: vec![],
            privacy: PrivacyLevel::Internal,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn miner() -> ReplayMiner {
        ReplayMiner::new(&ConsolidationConfig::default())
    }

    #[tokio::test]
    async fn test_mines_positive_preference() {
        let window = miner()
            .mine(&[episode(1, "User said: I love lo-fi music")])
            .await
            .unwrap();

        assert_eq!(window.candidates.len(), 1);
        let candidate = &window.candidates[0];
        assert_eq!(candidate.subject, "lo-fi music");
        assert_eq!(candidate.polarity, Some(Polarity::Positive));
        assert_eq!(candidate.statement, "User likely likes lo-fi music");
        assert!(candidate.confidence > 0.0 && candidate.confidence < 1.0);
        assert_eq!(candidate.episode_id, 1);
    }

    #[tokio::test]
    async fn test_mines_negative_preference() {
        let window = miner()
            .mine(&[episode(2, "I hate lo-fi music")])
            .await
            .unwrap();

        assert_eq!(window.candidates.len(), 1);
        assert_eq!(window.candidates[0].polarity, Some(Polarity::Negative));
        assert_eq!(window.candidates[0].subject, "lo-fi music");
    }

    #[tokio::test]
    async fn test_mines_dont_like() {
        let window = miner()
            .mine(&[episode(3, "honestly I don't like mornings, at all")])
            .await
            .unwrap();

        assert!(window
            .candidates
            .iter()
            .any(|c| c.subject == "mornings" && c.polarity == Some(Polarity::Negative)));
    }

    #[tokio::test]
    async fn test_no_preference_no_candidates() {
        let window = miner()
            .mine(&[episode(4, "Compiled the project successfully")])
            .await
            .unwrap();
        assert!(window.candidates.is_empty());
    }

    #[tokio::test]
    async fn test_verified_episode_allows_full_confidence() {
        let mut structured = Map::new();
        structured.insert("verified".to_string(), Value::Bool(true));
        let mut ep = episode(5, "I love green tea");
        ep.structured = Some(structured);

        let window = miner().mine(&[ep]).await.unwrap();
        assert!((window.candidates[0].confidence - 1.0).abs() < f64::EPSILON);
        assert!(window.candidates[0].verified);
    }

    #[tokio::test]
    async fn test_skill_outcome_extraction() {
        let mut structured = Map::new();
        structured.insert("skill".to_string(), Value::String("web_search".to_string()));
        structured.insert("outcome".to_string(), Value::String("failure".to_string()));
        structured.insert(
            "failure_mode".to_string(),
            Value::String("rate limited".to_string()),
        );
        let mut ep = episode(6, "Tried a search");
        ep.structured = Some(structured);

        let window = miner().mine(&[ep]).await.unwrap();
        assert_eq!(window.outcomes.len(), 1);
        let outcome = &window.outcomes[0];
        assert_eq!(outcome.skill, "web_search");
        assert!(!outcome.success);
        assert_eq!(outcome.failure_mode.as_deref(), Some("rate limited"));
    }

    #[tokio::test]
    async fn test_tag_counts() {
        let mut a = episode(7, "a");
        a.tags = vec!["music".to_string(), "chat".to_string()];
        let mut b = episode(8, "b");
        b.tags = vec!["music".to_string()];

        let window = miner().mine(&[a, b]).await.unwrap();
        assert_eq!(window.tag_counts.get("music"), Some(&2));
        assert_eq!(window.tag_counts.get("chat"), Some(&1));
    }

    #[test]
    fn test_merge_creates_then_corroborates() {
        let mut beliefs = BTreeMap::new();
        let candidate = |id: u64| BeliefCandidate {
            subject: "coffee".to_string(),
            polarity: Some(Polarity::Positive),
            statement: "User likely likes coffee".to_string(),
            confidence: 0.6,
            episode_id: id,
            verified: false,
        };

        let stats = ReplayMiner::merge_into(&mut beliefs, vec![candidate(1), candidate(2)], 0.25);
        assert_eq!(stats.created, 1);
        assert_eq!(stats.corroborated, 1);
        assert_eq!(beliefs.len(), 1);

        let belief = beliefs.values().next().unwrap();
        assert!((belief.confidence - 0.7).abs() < 1e-9);
        assert!(belief.evidence.contains(&1) && belief.evidence.contains(&2));
    }

    #[test]
    fn test_merge_opposite_polarity_not_merged() {
        let mut beliefs = BTreeMap::new();
        let like = BeliefCandidate {
            subject: "jazz".to_string(),
            polarity: Some(Polarity::Positive),
            statement: "User likely likes jazz".to_string(),
            confidence: 0.6,
            episode_id: 1,
            verified: false,
        };
        let dislike = BeliefCandidate {
            polarity: Some(Polarity::Negative),
            statement: "User likely dislikes jazz".to_string(),
            ..like.clone()
        };

        let stats = ReplayMiner::merge_into(&mut beliefs, vec![like, dislike], 0.25);
        assert_eq!(stats.created, 2);
        assert_eq!(beliefs.len(), 2);
    }

    struct CannedProvider(Vec<ExtractedClaim>);

    #[async_trait]
    impl ExtractionProvider for CannedProvider {
        async fn extract(&self, _text: &str) -> Result<ProviderResponse<Vec<ExtractedClaim>>> {
            Ok(ProviderResponse::Ready(self.0.clone()))
        }
    }

    struct OfflineProvider;

    #[async_trait]
    impl ExtractionProvider for OfflineProvider {
        async fn extract(&self, _text: &str) -> Result<ProviderResponse<Vec<ExtractedClaim>>> {
            Ok(ProviderResponse::Unavailable)
        }
    }

    struct BrokenProvider;

    #[async_trait]
    impl ExtractionProvider for BrokenProvider {
        async fn extract(&self, _text: &str) -> Result<ProviderResponse<Vec<ExtractedClaim>>> {
            Err(Error::Consolidation("extractor crashed".to_string()))
        }
    }

    #[tokio::test]
    async fn test_provider_claims_used() {
        let provider = Arc::new(CannedProvider(vec![ExtractedClaim {
            statement: "User works night shifts".to_string(),
            subject: "Night Shifts".to_string(),
            polarity: None,
            confidence: 0.8,
        }]));
        let miner = miner().with_provider(provider);

        let window = miner.mine(&[episode(9, "irrelevant")]).await.unwrap();
        assert_eq!(window.candidates.len(), 1);
        assert_eq!(window.candidates[0].subject, "night shifts");
        assert!((window.candidates[0].confidence - 0.8).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_unavailable_provider_falls_back() {
        let miner = miner().with_provider(Arc::new(OfflineProvider));
        let window = miner
            .mine(&[episode(10, "I like rainy days")])
            .await
            .unwrap();
        assert_eq!(window.candidates.len(), 1);
        assert_eq!(window.candidates[0].subject, "rainy days");
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let miner = miner().with_provider(Arc::new(BrokenProvider));
        let result = miner.mine(&[episode(11, "anything")]).await;
        assert!(result.is_err());
    }
}
