//! Question flow controller
//!
//! Pure selection logic over the catalog and the set of already-answered
//! question codes. Holds no state of its own, so the same session history
//! always yields the same next question.

use crate::catalog::{Question, QuestionCatalog, UserType};
use std::collections::HashSet;

/// Outcome of asking for the next question
#[derive(Debug, Clone)]
pub enum FlowStep {
    /// Serve this question next
    Ask(Question),
    /// Every question in the active pool is answered
    Completed,
}

impl FlowStep {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Progress through the active primary pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowProgress {
    /// Answered questions that belong to the active pool
    pub answered: usize,
    /// Size of the active pool for this user type
    pub total: usize,
}

/// Select the next primary question for a session
///
/// Required questions are exhausted first, in catalog order, then optional
/// ones. The active pool depends on the user type: before it is known only
/// audience-neutral questions are eligible, so the profiling question is
/// always served first. Questions the user answered earlier never repeat,
/// including branch questions that left the pool after a (hypothetical)
/// pool change.
pub fn next_question(
    catalog: &QuestionCatalog,
    user_type: Option<UserType>,
    answered: &HashSet<String>,
) -> FlowStep {
    let pool = catalog.primary_pool(user_type);
    let pick = pool
        .iter()
        .find(|q| q.required && !answered.contains(&q.code))
        .or_else(|| pool.iter().find(|q| !answered.contains(&q.code)));
    match pick {
        Some(question) => FlowStep::Ask((*question).clone()),
        None => FlowStep::Completed,
    }
}

/// Select the next deep-dive question, if any remain
///
/// Deep-dive questions are served only on explicit request after the
/// primary flow completed; they never block completion.
pub fn next_deep_dive(
    catalog: &QuestionCatalog,
    user_type: Option<UserType>,
    answered: &HashSet<String>,
) -> Option<Question> {
    catalog
        .deep_dive_pool(user_type)
        .into_iter()
        .find(|q| !answered.contains(&q.code))
        .cloned()
}

/// Progress counters over the active primary pool
pub fn progress(
    catalog: &QuestionCatalog,
    user_type: Option<UserType>,
    answered: &HashSet<String>,
) -> FlowProgress {
    let pool = catalog.primary_pool(user_type);
    let done = pool.iter().filter(|q| answered.contains(&q.code)).count();
    FlowProgress {
        answered: done,
        total: pool.len(),
    }
}

/// Whether a question code is answerable in the current pool
///
/// Used to reject answers to unknown codes or branch questions the session
/// cannot see. Deep-dive questions are always answerable once visible.
pub fn is_askable(catalog: &QuestionCatalog, user_type: Option<UserType>, code: &str) -> bool {
    catalog
        .get(code)
        .map(|q| q.audience.visible_to(user_type))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answered(codes: &[&str]) -> HashSet<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_first_question_is_user_type() {
        let catalog = QuestionCatalog::default();
        match next_question(&catalog, None, &HashSet::new()) {
            FlowStep::Ask(q) => assert_eq!(q.code, "user_type"),
            FlowStep::Completed => panic!("expected a question"),
        }
    }

    #[test]
    fn test_required_before_optional() {
        let catalog = QuestionCatalog::default();
        // All required corporate-pool questions answered; the optional
        // notes question comes last.
        let done = answered(&[
            "user_type",
            "region",
            "purpose",
            "budget",
            "urgency",
            "company_size",
        ]);
        match next_question(&catalog, Some(UserType::Corporate), &done) {
            FlowStep::Ask(q) => {
                assert_eq!(q.code, "notes");
                assert!(!q.required);
            }
            FlowStep::Completed => panic!("expected notes"),
        }
    }

    #[test]
    fn test_branch_question_served_for_corporate_only() {
        let catalog = QuestionCatalog::default();
        let done = answered(&["user_type", "region", "purpose", "budget", "urgency"]);
        match next_question(&catalog, Some(UserType::Corporate), &done) {
            FlowStep::Ask(q) => assert_eq!(q.code, "company_size"),
            FlowStep::Completed => panic!("expected company_size"),
        }
        match next_question(&catalog, Some(UserType::Individual), &done) {
            FlowStep::Ask(q) => assert_eq!(q.code, "business_registration"),
            FlowStep::Completed => panic!("expected business_registration"),
        }
    }

    #[test]
    fn test_completed_when_pool_exhausted() {
        let catalog = QuestionCatalog::default();
        let done = answered(&[
            "user_type",
            "region",
            "purpose",
            "budget",
            "urgency",
            "company_size",
            "notes",
        ]);
        assert!(next_question(&catalog, Some(UserType::Corporate), &done).is_completed());
    }

    #[test]
    fn test_answered_question_never_repeats() {
        let catalog = QuestionCatalog::default();
        let done = answered(&["user_type", "region"]);
        match next_question(&catalog, Some(UserType::Individual), &done) {
            FlowStep::Ask(q) => {
                assert!(!done.contains(&q.code));
            }
            FlowStep::Completed => panic!("pool is not exhausted"),
        }
    }

    #[test]
    fn test_deep_dive_does_not_block_completion() {
        let catalog = QuestionCatalog::default();
        let done = answered(&[
            "user_type",
            "region",
            "purpose",
            "budget",
            "urgency",
            "business_registration",
            "notes",
        ]);
        assert!(next_question(&catalog, Some(UserType::Individual), &done).is_completed());
        let deep = next_deep_dive(&catalog, Some(UserType::Individual), &done);
        assert_eq!(deep.unwrap().code, "challenges");
    }

    #[test]
    fn test_deep_dive_exhausts() {
        let catalog = QuestionCatalog::default();
        let done = answered(&["challenges", "past_grants"]);
        assert!(next_deep_dive(&catalog, Some(UserType::Corporate), &done).is_none());
    }

    #[test]
    fn test_progress_counts_active_pool_only() {
        let catalog = QuestionCatalog::default();
        let done = answered(&["user_type", "region", "challenges"]);
        let p = progress(&catalog, Some(UserType::Corporate), &done);
        // challenges is deep-dive, not part of the primary pool.
        assert_eq!(p.answered, 2);
        assert_eq!(p.total, 7);
    }

    #[test]
    fn test_is_askable_respects_audience() {
        let catalog = QuestionCatalog::default();
        assert!(is_askable(&catalog, None, "user_type"));
        assert!(!is_askable(&catalog, None, "company_size"));
        assert!(is_askable(&catalog, Some(UserType::Corporate), "company_size"));
        assert!(!is_askable(&catalog, Some(UserType::Individual), "company_size"));
        assert!(!is_askable(&catalog, Some(UserType::Corporate), "unknown_code"));
    }
}
