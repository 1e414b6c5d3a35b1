//! AI relevance scoring
//!
//! Second matching stage: rank the filtered candidates against the full
//! profile through the AI channel. Scoring never fails the request; when
//! the AI is unavailable or returns garbage, every candidate gets a neutral
//! score and the filter order is kept.

use crate::ai::{AiClient, CompletionRequest};
use crate::profile::UserProfile;
use crate::storage::Grant;
use serde::Deserialize;
use std::sync::Arc;

/// Neutral score assigned when the AI gives no usable number
pub const NEUTRAL_SCORE: f64 = 50.0;

const NEUTRAL_REASONING: &str =
    "Matches your declared criteria; detailed relevance scoring was unavailable.";

/// One scored candidate, pre-ranking
#[derive(Debug, Clone)]
pub struct ScoredGrant {
    pub grant: Grant,
    pub score: f64,
    pub reasoning: String,
}

/// Shape of one entry in the AI scoring response
#[derive(Debug, Deserialize)]
struct ScoreEntry {
    id: String,
    score: f64,
    #[serde(default)]
    reason: String,
}

/// Scores filtered candidates against a profile
pub struct GrantScorer {
    ai: Arc<dyn AiClient>,
    /// Batch size bound; at most this many results survive ranking
    top_n: usize,
}

impl GrantScorer {
    pub fn new(ai: Arc<dyn AiClient>, top_n: usize) -> Self {
        Self { ai, top_n }
    }

    /// Score and rank candidates, best first
    ///
    /// The scoring input is bounded: at most top-N candidates, in filter
    /// order, are listed in the prompt, so external-call cost stays flat
    /// however broadly the filter relaxed. Ordering is deterministic: score
    /// descending, then declared grant amount descending, then grant id
    /// ascending. Candidates the AI left out get the neutral score. On AI
    /// failure every candidate is scored neutrally and the filter order is
    /// preserved, so the user still gets recommendations.
    pub async fn score(&self, profile: &UserProfile, mut candidates: Vec<Grant>) -> Vec<ScoredGrant> {
        if candidates.is_empty() {
            return Vec::new();
        }
        if candidates.len() > self.top_n {
            tracing::debug!(
                total = candidates.len(),
                bound = self.top_n,
                "Bounding scoring input to top-N candidates"
            );
            candidates.truncate(self.top_n);
        }

        let request = scoring_request(profile, &candidates);
        match self.ai.complete(&request).await {
            Ok(response) => match parse_scores(&response) {
                Some(entries) => self.rank(candidates, entries),
                None => {
                    tracing::warn!("AI scoring returned unparseable output, using neutral scores");
                    self.neutral(candidates)
                }
            },
            Err(e) => {
                tracing::warn!("AI scoring unavailable ({}), using neutral scores", e);
                self.neutral(candidates)
            }
        }
    }

    fn rank(&self, candidates: Vec<Grant>, entries: Vec<ScoreEntry>) -> Vec<ScoredGrant> {
        let mut scored: Vec<ScoredGrant> = candidates
            .into_iter()
            .map(|grant| {
                match entries.iter().find(|e| e.id == grant.id) {
                    Some(entry) => ScoredGrant {
                        score: entry.score.clamp(0.0, 100.0),
                        reasoning: if entry.reason.trim().is_empty() {
                            NEUTRAL_REASONING.to_string()
                        } else {
                            entry.reason.clone()
                        },
                        grant,
                    },
                    // The AI skipped this candidate; keep it, neutrally.
                    None => ScoredGrant {
                        score: NEUTRAL_SCORE,
                        reasoning: NEUTRAL_REASONING.to_string(),
                        grant,
                    },
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.grant.declared_amount().cmp(&a.grant.declared_amount()))
                .then_with(|| a.grant.id.cmp(&b.grant.id))
        });
        scored.truncate(self.top_n);
        scored
    }

    /// Neutral fallback: filter order, uniform score, generic reasoning
    fn neutral(&self, candidates: Vec<Grant>) -> Vec<ScoredGrant> {
        candidates
            .into_iter()
            .take(self.top_n)
            .map(|grant| ScoredGrant {
                score: NEUTRAL_SCORE,
                reasoning: NEUTRAL_REASONING.to_string(),
                grant,
            })
            .collect()
    }
}

/// Build the scoring prompt for one candidate batch
fn scoring_request(profile: &UserProfile, candidates: &[Grant]) -> CompletionRequest {
    let system = "You score grant programs for relevance to an applicant profile. \
         Respond with JSON only, no prose: a JSON array of \
         {\"id\": \"<grant_id>\", \"score\": <0-100>, \"reason\": \"<one sentence>\"}. \
         Score every listed grant.";
    let candidate_list = candidates
        .iter()
        .map(describe_grant)
        .collect::<Vec<_>>()
        .join("\n");
    let user = format!(
        "Applicant profile:\n{}\n\nCandidate grants:\n{}",
        profile.summary(),
        candidate_list
    );
    CompletionRequest::new(system, user)
}

fn describe_grant(grant: &Grant) -> String {
    let amount = match (grant.amount_min, grant.amount_max) {
        (Some(lo), Some(hi)) => format!("{}-{} yen", lo, hi),
        (None, Some(hi)) => format!("up to {} yen", hi),
        (Some(lo), None) => format!("from {} yen", lo),
        (None, None) => "amount unrestricted".to_string(),
    };
    let deadline = grant
        .deadline
        .map(|d| d.to_string())
        .unwrap_or_else(|| "rolling".to_string());
    format!(
        "- id={} title={} org={} amount={} deadline={} regions={} categories={}{}",
        grant.id,
        grant.title,
        grant.organization,
        amount,
        deadline,
        grant.region_tags.join("/"),
        grant.category_tags.join("/"),
        grant
            .target_text
            .as_deref()
            .map(|t| format!(" target={}", t))
            .unwrap_or_default(),
    )
}

/// Parse the AI scoring response into entries, tolerating code fences
fn parse_scores(response: &str) -> Option<Vec<ScoreEntry>> {
    let start = response.find('[')?;
    let end = response.rfind(']')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&response[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::CompletionRequest;
    use crate::error::{GrantflowError, Result};
    use crate::storage::GrantStatus;
    use async_trait::async_trait;

    struct StubAi {
        response: std::result::Result<String, String>,
    }

    #[async_trait]
    impl AiClient for StubAi {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
            match &self.response {
                Ok(s) => Ok(s.clone()),
                Err(e) => Err(GrantflowError::Provider(e.clone()).into()),
            }
        }
    }

    /// AI stub that captures the prompt it was sent
    #[derive(Default)]
    struct RecordingAi {
        prompt: std::sync::Mutex<Option<String>>,
    }

    #[async_trait]
    impl AiClient for RecordingAi {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            *self.prompt.lock().unwrap() = Some(request.user.clone());
            Ok("[]".to_string())
        }
    }

    fn scorer(response: std::result::Result<&str, &str>, top_n: usize) -> GrantScorer {
        GrantScorer::new(
            Arc::new(StubAi {
                response: response.map(String::from).map_err(String::from),
            }),
            top_n,
        )
    }

    fn grant(id: &str, amount_max: Option<i64>) -> Grant {
        Grant {
            id: id.into(),
            title: format!("Grant {}", id),
            organization: "Org".into(),
            amount_min: None,
            amount_max,
            deadline: None,
            region_tags: vec!["tokyo".into()],
            category_tags: vec!["it".into()],
            status: GrantStatus::Open,
            target_text: None,
            link: None,
        }
    }

    #[tokio::test]
    async fn test_scores_ranked_descending() {
        let response = r#"[
            {"id": "g1", "score": 40, "reason": "weak fit"},
            {"id": "g2", "score": 90, "reason": "strong fit"}
        ]"#;
        let scorer = scorer(Ok(response), 10);
        let ranked = scorer
            .score(&UserProfile::default(), vec![grant("g1", None), grant("g2", None)])
            .await;
        assert_eq!(ranked[0].grant.id, "g2");
        assert_eq!(ranked[0].score, 90.0);
        assert_eq!(ranked[1].grant.id, "g1");
    }

    #[tokio::test]
    async fn test_missing_candidate_gets_neutral_score() {
        let response = r#"[{"id": "g1", "score": 80, "reason": "fits"}]"#;
        let scorer = scorer(Ok(response), 10);
        let ranked = scorer
            .score(&UserProfile::default(), vec![grant("g1", None), grant("g2", None)])
            .await;
        assert_eq!(ranked.len(), 2);
        let g2 = ranked.iter().find(|s| s.grant.id == "g2").unwrap();
        assert_eq!(g2.score, NEUTRAL_SCORE);
        assert!(!g2.reasoning.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_scores_clamped() {
        let response = r#"[
            {"id": "g1", "score": 250, "reason": "over"},
            {"id": "g2", "score": -10, "reason": "under"}
        ]"#;
        let scorer = scorer(Ok(response), 10);
        let ranked = scorer
            .score(&UserProfile::default(), vec![grant("g1", None), grant("g2", None)])
            .await;
        assert_eq!(ranked[0].score, 100.0);
        assert_eq!(ranked[1].score, 0.0);
    }

    #[tokio::test]
    async fn test_tie_breaks_on_amount_then_id() {
        let response = r#"[
            {"id": "g_a", "score": 70, "reason": "tie"},
            {"id": "g_b", "score": 70, "reason": "tie"},
            {"id": "g_c", "score": 70, "reason": "tie"}
        ]"#;
        let scorer = scorer(Ok(response), 10);
        let ranked = scorer
            .score(
                &UserProfile::default(),
                vec![
                    grant("g_c", Some(1_000_000)),
                    grant("g_b", Some(5_000_000)),
                    grant("g_a", Some(1_000_000)),
                ],
            )
            .await;
        let ids: Vec<&str> = ranked.iter().map(|s| s.grant.id.as_str()).collect();
        // Larger amount first, then id ascending among equals.
        assert_eq!(ids, vec!["g_b", "g_a", "g_c"]);
    }

    #[tokio::test]
    async fn test_ai_failure_neutral_keeps_filter_order() {
        let scorer = scorer(Err("down"), 10);
        let ranked = scorer
            .score(
                &UserProfile::default(),
                vec![grant("g2", Some(1)), grant("g1", Some(100))],
            )
            .await;
        let ids: Vec<&str> = ranked.iter().map(|s| s.grant.id.as_str()).collect();
        assert_eq!(ids, vec!["g2", "g1"]);
        assert!(ranked.iter().all(|s| s.score == NEUTRAL_SCORE));
    }

    #[tokio::test]
    async fn test_unparseable_response_neutral() {
        let scorer = scorer(Ok("I think grant g1 is great!"), 10);
        let ranked = scorer
            .score(&UserProfile::default(), vec![grant("g1", None)])
            .await;
        assert_eq!(ranked[0].score, NEUTRAL_SCORE);
    }

    #[tokio::test]
    async fn test_top_n_bound_applied() {
        let response = r#"[
            {"id": "g1", "score": 90, "reason": "a"},
            {"id": "g2", "score": 80, "reason": "b"},
            {"id": "g3", "score": 70, "reason": "c"}
        ]"#;
        let scorer = scorer(Ok(response), 2);
        let ranked = scorer
            .score(
                &UserProfile::default(),
                vec![grant("g1", None), grant("g2", None), grant("g3", None)],
            )
            .await;
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].grant.id, "g1");
        assert_eq!(ranked[1].grant.id, "g2");
    }

    #[tokio::test]
    async fn test_prompt_input_bounded_to_top_n() {
        let recorder = Arc::new(RecordingAi::default());
        let scorer = GrantScorer::new(recorder.clone(), 2);
        let candidates: Vec<Grant> = (0..50)
            .map(|i| grant(&format!("g{:02}", i), None))
            .collect();

        let ranked = scorer.score(&UserProfile::default(), candidates).await;
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].grant.id, "g00");

        // Only the bounded candidate list reaches the prompt.
        let prompt = recorder.prompt.lock().unwrap().clone().unwrap();
        assert_eq!(prompt.matches("- id=g").count(), 2);
        assert!(prompt.contains("id=g00"));
        assert!(prompt.contains("id=g01"));
        assert!(!prompt.contains("id=g02"));
    }

    #[tokio::test]
    async fn test_empty_candidates_empty_result() {
        let scorer = scorer(Ok("[]"), 10);
        assert!(scorer
            .score(&UserProfile::default(), Vec::new())
            .await
            .is_empty());
    }

    #[test]
    fn test_parse_scores_strips_fences() {
        let text = "```json\n[{\"id\": \"g1\", \"score\": 50}]\n```";
        let entries = parse_scores(text).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "g1");
    }
}
