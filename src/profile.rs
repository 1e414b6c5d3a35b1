//! User profile derivation
//!
//! Folds a session's ordered conversation history into the structured
//! profile the filter and scorer consume. Derivation is pure: the same
//! history always yields the same profile. Free-text answers to choice
//! questions (the interpretation fallback path) leave the structured
//! dimension unset and surface only in the free-text notes.

use crate::catalog::UserType;
use crate::storage::HistoryEntry;
use chrono::{Duration, NaiveDate};

/// Structured matching profile for one session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserProfile {
    pub user_type: Option<UserType>,
    /// Declared region option id
    pub region: Option<String>,
    /// Declared purpose option ids
    pub purposes: Vec<String>,
    /// Declared budget option id
    pub budget: Option<String>,
    /// Declared urgency option id
    pub urgency: Option<String>,
    /// Free-text material for scoring prompts: (question text, answer text)
    pub notes: Vec<(String, String)>,
}

impl UserProfile {
    /// Derive a profile from a session's history
    ///
    /// Later entries win for single-valued dimensions, matching the answer
    /// resubmission semantics of the store.
    pub fn from_history(user_type: Option<UserType>, history: &[HistoryEntry]) -> Self {
        let mut profile = Self {
            user_type,
            ..Self::default()
        };
        for entry in history {
            let ids = entry.answer.option_ids();
            match entry.question_id.as_str() {
                "user_type" => {}
                "region" => {
                    if let Some(id) = ids.first() {
                        profile.region = Some(id.to_string());
                    } else {
                        profile.push_note(entry);
                    }
                }
                "purpose" => {
                    if ids.is_empty() {
                        profile.push_note(entry);
                    } else {
                        profile.purposes = ids.iter().map(|s| s.to_string()).collect();
                    }
                }
                "budget" => {
                    if let Some(id) = ids.first() {
                        profile.budget = Some(id.to_string());
                    } else {
                        profile.push_note(entry);
                    }
                }
                "urgency" => {
                    if let Some(id) = ids.first() {
                        profile.urgency = Some(id.to_string());
                    } else {
                        profile.push_note(entry);
                    }
                }
                _ => {
                    // Branch, notes, and deep-dive answers all inform the
                    // scorer through the free-text section.
                    if let Some(text) = entry.answer.as_text() {
                        profile
                            .notes
                            .push((entry.question_text.clone(), text.to_string()));
                    } else if !ids.is_empty() {
                        profile
                            .notes
                            .push((entry.question_text.clone(), entry.answer_label.clone()));
                    }
                }
            }
        }
        profile
    }

    fn push_note(&mut self, entry: &HistoryEntry) {
        if let Some(text) = entry.answer.as_text() {
            self.notes
                .push((entry.question_text.clone(), text.to_string()));
        }
    }

    /// Declared budget as a yen range, if a band was selected
    ///
    /// `unspecified` deactivates the amount constraint entirely.
    pub fn amount_range(&self) -> Option<(i64, i64)> {
        match self.budget.as_deref() {
            Some("under_1m") => Some((0, 1_000_000)),
            Some("1m_to_5m") => Some((1_000_000, 5_000_000)),
            Some("5m_to_10m") => Some((5_000_000, 10_000_000)),
            Some("over_10m") => Some((10_000_000, i64::MAX)),
            _ => None,
        }
    }

    /// Declared urgency as a deadline horizon in days
    ///
    /// `anytime` (or no answer) deactivates the deadline constraint.
    pub fn urgency_days(&self) -> Option<i64> {
        match self.urgency.as_deref() {
            Some("within_1_month") => Some(30),
            Some("within_3_months") => Some(90),
            Some("within_6_months") => Some(180),
            _ => None,
        }
    }

    /// Deadline window implied by the declared urgency
    pub fn deadline_window(&self, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        self.urgency_days()
            .map(|days| (today, today + Duration::days(days)))
    }

    /// Whether the user needs to apply within a month
    ///
    /// Tight timelines exclude upcoming (not yet open) grants from the
    /// candidate set.
    pub fn is_urgent(&self) -> bool {
        self.urgency.as_deref() == Some("within_1_month")
    }

    /// Human-readable profile summary for scoring prompts
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        if let Some(user_type) = self.user_type {
            lines.push(format!("Applicant type: {}", user_type));
        }
        if let Some(region) = &self.region {
            lines.push(format!("Region: {}", region));
        }
        if !self.purposes.is_empty() {
            lines.push(format!("Funding purposes: {}", self.purposes.join(", ")));
        }
        if let Some(budget) = &self.budget {
            lines.push(format!("Budget band: {}", budget));
        }
        if let Some(urgency) = &self.urgency {
            lines.push(format!("Timeline: {}", urgency));
        }
        for (question, answer) in &self.notes {
            lines.push(format!("{} {}", question, answer));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::AnswerValue;
    use chrono::Utc;

    fn entry(seq: i64, question_id: &str, answer: AnswerValue) -> HistoryEntry {
        HistoryEntry {
            seq,
            session_id: "s1".into(),
            question_id: question_id.into(),
            question_text: format!("{}?", question_id),
            answer_label: "label".into(),
            answer,
            created_at: Utc::now(),
        }
    }

    fn choice(id: &str) -> AnswerValue {
        AnswerValue::Choice { option: id.into() }
    }

    #[test]
    fn test_profile_from_full_history() {
        let history = vec![
            entry(1, "user_type", choice("corporate")),
            entry(2, "region", choice("tokyo")),
            entry(
                3,
                "purpose",
                AnswerValue::MultiChoice {
                    options: vec!["it".into(), "hiring".into()],
                },
            ),
            entry(4, "budget", choice("1m_to_5m")),
            entry(5, "urgency", choice("within_3_months")),
            entry(6, "company_size", choice("6_to_20")),
            entry(
                7,
                "notes",
                AnswerValue::FreeText {
                    text: "Expanding next year".into(),
                },
            ),
        ];
        let profile = UserProfile::from_history(Some(UserType::Corporate), &history);
        assert_eq!(profile.region.as_deref(), Some("tokyo"));
        assert_eq!(profile.purposes, vec!["it", "hiring"]);
        assert_eq!(profile.amount_range(), Some((1_000_000, 5_000_000)));
        assert_eq!(profile.urgency_days(), Some(90));
        assert!(!profile.is_urgent());
        // Branch and notes answers land in the free-text section.
        assert_eq!(profile.notes.len(), 2);
    }

    #[test]
    fn test_interpreted_answer_counts_as_structured() {
        let history = vec![entry(
            1,
            "budget",
            AnswerValue::Interpreted {
                options: vec!["under_1m".into()],
                confidence: 0.8,
            },
        )];
        let profile = UserProfile::from_history(None, &history);
        assert_eq!(profile.amount_range(), Some((0, 1_000_000)));
    }

    #[test]
    fn test_uninterpreted_text_leaves_dimension_unset() {
        let history = vec![entry(
            1,
            "budget",
            AnswerValue::FreeText {
                text: "around two million".into(),
            },
        )];
        let profile = UserProfile::from_history(None, &history);
        assert!(profile.budget.is_none());
        assert!(profile.amount_range().is_none());
        // But the literal text still reaches the scorer.
        assert_eq!(profile.notes.len(), 1);
    }

    #[test]
    fn test_unspecified_budget_deactivates_constraint() {
        let history = vec![entry(1, "budget", choice("unspecified"))];
        let profile = UserProfile::from_history(None, &history);
        assert_eq!(profile.budget.as_deref(), Some("unspecified"));
        assert!(profile.amount_range().is_none());
    }

    #[test]
    fn test_anytime_deactivates_deadline_window() {
        let history = vec![entry(1, "urgency", choice("anytime"))];
        let profile = UserProfile::from_history(None, &history);
        assert!(profile.urgency_days().is_none());
        let today = NaiveDate::from_ymd_opt(2026, 8, 27).unwrap();
        assert!(profile.deadline_window(today).is_none());
    }

    #[test]
    fn test_urgent_flag() {
        let history = vec![entry(1, "urgency", choice("within_1_month"))];
        let profile = UserProfile::from_history(None, &history);
        assert!(profile.is_urgent());
        let today = NaiveDate::from_ymd_opt(2026, 8, 27).unwrap();
        let (from, to) = profile.deadline_window(today).unwrap();
        assert_eq!(from, today);
        assert_eq!(to, NaiveDate::from_ymd_opt(2026, 9, 26).unwrap());
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let history = vec![
            entry(1, "region", choice("osaka")),
            entry(2, "budget", choice("over_10m")),
        ];
        let a = UserProfile::from_history(Some(UserType::Individual), &history);
        let b = UserProfile::from_history(Some(UserType::Individual), &history);
        assert_eq!(a, b);
    }

    #[test]
    fn test_summary_mentions_dimensions() {
        let history = vec![
            entry(1, "region", choice("tokyo")),
            entry(
                2,
                "purpose",
                AnswerValue::MultiChoice {
                    options: vec!["it".into()],
                },
            ),
        ];
        let profile = UserProfile::from_history(Some(UserType::Corporate), &history);
        let summary = profile.summary();
        assert!(summary.contains("tokyo"));
        assert!(summary.contains("it"));
        assert!(summary.contains("corporate"));
    }
}
