//! Recommendation orchestration
//!
//! Ties the pipeline together: profile derivation, candidate filtering, AI
//! scoring, the per-session result cache, and the feedback loop. A session
//! gets exactly one persisted batch until an explicit rematch discards it.

use crate::ai::{AiClient, CompletionRequest};
use crate::error::{GrantflowError, Result};
use crate::filter::{filter_candidates, ConstraintKind};
use crate::profile::UserProfile;
use crate::scorer::GrantScorer;
use crate::storage::{Grant, MatchingResult, Session, SqliteStorage};
use chrono::Utc;
use std::sync::Arc;

/// Clarifying questions served when the AI cannot generate any
const FALLBACK_CLARIFYING: [&str; 3] = [
    "Which part of this recommendation missed the mark: the funding amount, the region, or the purpose?",
    "Is there a funding purpose we should weigh more heavily?",
    "Would you prefer grants with a later application deadline?",
];

/// One recommendation as served to the user
#[derive(Debug, Clone)]
pub struct Recommendation {
    pub rank: u32,
    pub grant: Grant,
    pub score: f64,
    pub reasoning: String,
    pub feedback_rating: Option<i32>,
    pub feedback_helpful: Option<bool>,
}

/// A full recommendation batch for one session
#[derive(Debug, Clone)]
pub struct RecommendationBatch {
    pub recommendations: Vec<Recommendation>,
    /// True when the batch was served from the cache
    pub cached: bool,
    /// Constraints the filter dropped while computing this batch; always
    /// empty on a cache hit
    pub relaxed: Vec<ConstraintKind>,
}

/// Outcome of recording feedback
#[derive(Debug, Clone)]
pub struct FeedbackOutcome {
    /// Non-empty exactly when the feedback was negative
    pub clarifying_questions: Vec<String>,
}

/// Orchestrates matching, caching, and feedback for sessions
pub struct RecommendationService {
    storage: Arc<SqliteStorage>,
    ai: Arc<dyn AiClient>,
    scorer: GrantScorer,
    relaxation_order: Vec<ConstraintKind>,
}

impl RecommendationService {
    pub fn new(
        storage: Arc<SqliteStorage>,
        ai: Arc<dyn AiClient>,
        top_n: usize,
        relaxation_order: Vec<ConstraintKind>,
    ) -> Self {
        let scorer = GrantScorer::new(ai.clone(), top_n);
        Self {
            storage,
            ai,
            scorer,
            relaxation_order,
        }
    }

    /// Serve the session's batch, computing it on first request
    ///
    /// A cached batch is returned verbatim, with scores and order exactly as
    /// persisted. On a miss the pipeline runs and the ranked batch is
    /// persisted atomically; if a concurrent request persisted first, that
    /// batch wins and is served instead. An empty result is cached too: the
    /// completed flag records that the pipeline already ran, so repeat reads
    /// do not re-run the filter and scorer until an explicit rematch.
    pub async fn get_or_compute(&self, session_id: &str) -> Result<RecommendationBatch> {
        let session = self.require_session(session_id)?;

        let cached = self.storage.load_batch(session_id)?;
        if !cached.is_empty() {
            return Ok(RecommendationBatch {
                recommendations: self.hydrate(&cached)?,
                cached: true,
                relaxed: Vec::new(),
            });
        }
        if session.completed {
            return Ok(RecommendationBatch {
                recommendations: Vec::new(),
                cached: true,
                relaxed: Vec::new(),
            });
        }
        self.compute(&session).await
    }

    /// Discard the cached batch and recompute against current data
    ///
    /// Rematch is atomic with respect to readers: the old batch is deleted
    /// and the new one inserted before the response is built, so no request
    /// observes a half-replaced batch from this writer.
    pub async fn rematch(&self, session_id: &str) -> Result<RecommendationBatch> {
        let session = self.require_session(session_id)?;
        let removed = self.storage.delete_batch(session_id)?;
        if removed > 0 {
            tracing::info!(session_id, removed, "Discarded cached batch for rematch");
        }
        self.compute(&session).await
    }

    /// Record feedback on one recommendation
    ///
    /// Negative feedback (a low rating, or not-helpful) triggers clarifying
    /// questions so the user can refine their answers and rematch. Question
    /// generation degrades to a built-in list when the AI is unavailable.
    pub async fn feedback(
        &self,
        session_id: &str,
        grant_id: &str,
        rating: i32,
        text: Option<&str>,
        helpful: bool,
    ) -> Result<FeedbackOutcome> {
        if !(1..=5).contains(&rating) {
            return Err(
                GrantflowError::Validation(format!("Rating must be 1-5, got {}", rating)).into(),
            );
        }
        let session = self.require_session(session_id)?;

        let updated = self
            .storage
            .update_feedback(session_id, grant_id, rating, text, helpful)?;
        if !updated {
            return Err(GrantflowError::RecommendationNotFound(grant_id.to_string()).into());
        }

        let negative = rating <= 2 || !helpful;
        if !negative {
            return Ok(FeedbackOutcome {
                clarifying_questions: Vec::new(),
            });
        }

        let history = self.storage.history(session_id)?;
        let profile = UserProfile::from_history(session.user_type, &history);
        Ok(FeedbackOutcome {
            clarifying_questions: self.clarifying_questions(&profile, text).await,
        })
    }

    fn require_session(&self, session_id: &str) -> Result<Session> {
        self.storage
            .get_session(session_id)?
            .ok_or_else(|| GrantflowError::SessionNotFound(session_id.to_string()).into())
    }

    /// Run the pipeline and persist the batch
    async fn compute(&self, session: &Session) -> Result<RecommendationBatch> {
        let history = self.storage.history(&session.session_id)?;
        let profile = UserProfile::from_history(session.user_type, &history);
        let today = Utc::now().date_naive();

        let outcome =
            filter_candidates(&self.storage, &profile, &self.relaxation_order, today)?;
        let scored = self.scorer.score(&profile, outcome.grants).await;

        let rows: Vec<MatchingResult> = scored
            .iter()
            .enumerate()
            .map(|(i, s)| MatchingResult {
                session_id: session.session_id.clone(),
                grant_id: s.grant.id.clone(),
                score: s.score,
                reasoning: s.reasoning.clone(),
                rank: (i + 1) as u32,
                feedback_rating: None,
                feedback_text: None,
                feedback_helpful: None,
            })
            .collect();

        if rows.is_empty() {
            self.storage.mark_completed(&session.session_id)?;
            return Ok(RecommendationBatch {
                recommendations: Vec::new(),
                cached: false,
                relaxed: outcome.relaxed,
            });
        }

        if self.storage.insert_batch(&rows)? {
            self.storage.mark_completed(&session.session_id)?;
            let recommendations = rows
                .iter()
                .zip(scored)
                .map(|(row, s)| Recommendation {
                    rank: row.rank,
                    grant: s.grant,
                    score: row.score,
                    reasoning: row.reasoning.clone(),
                    feedback_rating: None,
                    feedback_helpful: None,
                })
                .collect();
            return Ok(RecommendationBatch {
                recommendations,
                cached: false,
                relaxed: outcome.relaxed,
            });
        }

        // A concurrent request persisted a batch first; serve that one.
        tracing::info!(
            session_id = %session.session_id,
            "Concurrent batch insert detected, serving persisted batch"
        );
        let persisted = self.storage.load_batch(&session.session_id)?;
        Ok(RecommendationBatch {
            recommendations: self.hydrate(&persisted)?,
            cached: true,
            relaxed: Vec::new(),
        })
    }

    /// Join stored result rows with their grant records, in rank order
    fn hydrate(&self, rows: &[MatchingResult]) -> Result<Vec<Recommendation>> {
        let ids: Vec<String> = rows.iter().map(|r| r.grant_id.clone()).collect();
        let grants = self.storage.grants_by_ids(&ids)?;
        let mut recommendations = Vec::with_capacity(rows.len());
        for row in rows {
            let grant = grants
                .iter()
                .find(|g| g.id == row.grant_id)
                .cloned()
                .ok_or_else(|| {
                    GrantflowError::Storage(format!(
                        "Cached result references missing grant: {}",
                        row.grant_id
                    ))
                })?;
            recommendations.push(Recommendation {
                rank: row.rank,
                grant,
                score: row.score,
                reasoning: row.reasoning.clone(),
                feedback_rating: row.feedback_rating,
                feedback_helpful: row.feedback_helpful,
            });
        }
        Ok(recommendations)
    }

    /// Generate clarifying questions, degrading to the built-in list
    async fn clarifying_questions(
        &self,
        profile: &UserProfile,
        feedback_text: Option<&str>,
    ) -> Vec<String> {
        let system = "A user was unhappy with a grant recommendation. Propose up to three \
             short clarifying questions that would refine their profile. Respond with \
             JSON only: a JSON array of question strings.";
        let user = format!(
            "Profile:\n{}\n\nUser feedback: {}",
            profile.summary(),
            feedback_text.unwrap_or("(none)")
        );
        let request = CompletionRequest::new(system, user);

        let generated = match self.ai.complete(&request).await {
            Ok(response) => parse_questions(&response),
            Err(e) => {
                tracing::warn!("Clarifying question generation unavailable: {}", e);
                Vec::new()
            }
        };
        if generated.is_empty() {
            FALLBACK_CLARIFYING.iter().map(|s| s.to_string()).collect()
        } else {
            generated
        }
    }
}

/// Parse a JSON array of question strings, tolerating code fences
fn parse_questions(response: &str) -> Vec<String> {
    let (Some(start), Some(end)) = (response.find('['), response.rfind(']')) else {
        return Vec::new();
    };
    if end < start {
        return Vec::new();
    }
    let parsed: Vec<String> = match serde_json::from_str(&response[start..=end]) {
        Ok(questions) => questions,
        Err(_) => return Vec::new(),
    };
    parsed
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .take(3)
        .collect()
}
