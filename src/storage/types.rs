//! Stored row types for the Grantflow datastore

use crate::catalog::UserType;
use crate::interpreter::AnswerValue;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One user's conversation identity and progress counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque, caller-unguessable id (uuid v4)
    pub session_id: String,
    /// Remote address captured on first contact
    pub origin_address: Option<String>,
    /// User agent captured on first contact
    pub origin_agent: Option<String>,
    /// Set at most once by the first profiling answer, never reverts
    pub user_type: Option<UserType>,
    /// Monotonic answer counter
    pub answered_count: u32,
    /// Set when the first recommendation batch is computed
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One answered question in a session's ordered history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Insertion sequence, strictly increasing per session
    pub seq: i64,
    pub session_id: String,
    pub question_id: String,
    pub question_text: String,
    /// Normalized answer value (tagged union)
    pub answer: AnswerValue,
    /// Display label for the answer
    pub answer_label: String,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle status of a grant record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantStatus {
    Open,
    Upcoming,
    Closed,
}

impl GrantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Upcoming => "upcoming",
            Self::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "upcoming" => Some(Self::Upcoming),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// One grant record from the read-only corpus
///
/// This core never mutates grants; the table is populated externally (or
/// via the operator seed command).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grant {
    pub id: String,
    pub title: String,
    pub organization: String,
    /// Lower amount bound in yen; None means no restriction
    pub amount_min: Option<i64>,
    /// Upper amount bound in yen; None means no restriction
    pub amount_max: Option<i64>,
    /// Application deadline; None means rolling/ongoing
    pub deadline: Option<NaiveDate>,
    /// Region tags; `nationwide` matches every declared region
    pub region_tags: Vec<String>,
    /// Category/purpose tags
    pub category_tags: Vec<String>,
    pub status: GrantStatus,
    /// Free-text target/eligibility description
    pub target_text: Option<String>,
    /// Official link
    pub link: Option<String>,
}

impl Grant {
    /// Declared grant amount used for deterministic tie-breaking
    pub fn declared_amount(&self) -> i64 {
        self.amount_max.or(self.amount_min).unwrap_or(0)
    }
}

/// One ranked recommendation row for a session
///
/// Score, reasoning, and rank are immutable after batch creation; only the
/// feedback fields are mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingResult {
    pub session_id: String,
    pub grant_id: String,
    /// Relevance score in 0..=100
    pub score: f64,
    /// Free-text justification
    pub reasoning: String,
    /// 1-based rank, unique and contiguous per session batch
    pub rank: u32,
    pub feedback_rating: Option<i32>,
    pub feedback_text: Option<String>,
    pub feedback_helpful: Option<bool>,
}
