//! Rule-based candidate filtering
//!
//! First matching stage: reduce the grant corpus to candidates that satisfy
//! the profile's declared constraints, then progressively relax constraints
//! when the strict query comes back empty. Grant status is a hard
//! constraint and is never relaxed.

use crate::error::Result;
use crate::profile::UserProfile;
use crate::storage::{Grant, GrantQuery, GrantStatus, SqliteStorage};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One relaxable filter dimension
///
/// The relaxation order is configurable; the default drops the constraints
/// least likely to disqualify a grant outright first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Deadline,
    Amount,
    Category,
    Region,
}

impl std::fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deadline => write!(f, "deadline"),
            Self::Amount => write!(f, "amount"),
            Self::Category => write!(f, "category"),
            Self::Region => write!(f, "region"),
        }
    }
}

/// Default relaxation order
pub fn default_relaxation_order() -> Vec<ConstraintKind> {
    vec![
        ConstraintKind::Deadline,
        ConstraintKind::Amount,
        ConstraintKind::Category,
        ConstraintKind::Region,
    ]
}

/// Result of the filtering stage
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    /// Candidates in corpus id order
    pub grants: Vec<Grant>,
    /// Constraints dropped to produce a non-empty set, in drop order
    pub relaxed: Vec<ConstraintKind>,
}

/// Build the strict query implied by a profile
///
/// Every declared dimension becomes an active constraint; undeclared
/// dimensions stay inactive. Upcoming grants are tolerated except on a
/// within-a-month timeline, where only open grants qualify. Closed grants
/// never qualify.
pub fn base_query(profile: &UserProfile, today: NaiveDate) -> GrantQuery {
    let statuses = if profile.is_urgent() {
        vec![GrantStatus::Open]
    } else {
        vec![GrantStatus::Open, GrantStatus::Upcoming]
    };
    GrantQuery {
        statuses,
        region: profile.region.clone(),
        categories: profile.purposes.clone(),
        amount_range: profile.amount_range(),
        deadline_window: profile.deadline_window(today),
    }
}

/// Filter the corpus against a profile, relaxing on empty results
///
/// Relaxation is cumulative: constraints are dropped one at a time in the
/// configured order until the query returns candidates or every relaxable
/// constraint is gone. Constraints the profile never declared are skipped
/// silently.
pub fn filter_candidates(
    storage: &SqliteStorage,
    profile: &UserProfile,
    relaxation_order: &[ConstraintKind],
    today: NaiveDate,
) -> Result<FilterOutcome> {
    let mut query = base_query(profile, today);
    let mut relaxed = Vec::new();

    let grants = storage.query_grants(&query)?;
    if !grants.is_empty() {
        return Ok(FilterOutcome { grants, relaxed });
    }

    for kind in relaxation_order {
        if !drop_constraint(&mut query, *kind) {
            continue;
        }
        relaxed.push(*kind);
        tracing::warn!(constraint = %kind, "No candidates under strict filter, relaxing");
        let grants = storage.query_grants(&query)?;
        if !grants.is_empty() {
            return Ok(FilterOutcome { grants, relaxed });
        }
    }

    Ok(FilterOutcome {
        grants: Vec::new(),
        relaxed,
    })
}

/// Remove one constraint from the query; false if it was not active
fn drop_constraint(query: &mut GrantQuery, kind: ConstraintKind) -> bool {
    match kind {
        ConstraintKind::Deadline => query.deadline_window.take().is_some(),
        ConstraintKind::Amount => query.amount_range.take().is_some(),
        ConstraintKind::Category => {
            let active = !query.categories.is_empty();
            query.categories.clear();
            active
        }
        ConstraintKind::Region => query.region.take().is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 27).unwrap()
    }

    fn storage_with(grants: &[Grant]) -> (SqliteStorage, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let storage = SqliteStorage::new_with_path(dir.path().join("test.db")).unwrap();
        storage.seed_grants(grants).unwrap();
        (storage, dir)
    }

    fn grant(id: &str, region: &str, category: &str, status: GrantStatus) -> Grant {
        Grant {
            id: id.into(),
            title: format!("Grant {}", id),
            organization: "Org".into(),
            amount_min: Some(1_000_000),
            amount_max: Some(3_000_000),
            deadline: Some(NaiveDate::from_ymd_opt(2026, 10, 31).unwrap()),
            region_tags: vec![region.into()],
            category_tags: vec![category.into()],
            status,
            target_text: None,
            link: None,
        }
    }

    fn profile(region: &str, purposes: &[&str]) -> UserProfile {
        UserProfile {
            region: Some(region.into()),
            purposes: purposes.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_strict_match_no_relaxation() {
        let (storage, _dir) = storage_with(&[
            grant("g1", "tokyo", "it", GrantStatus::Open),
            grant("g2", "osaka", "it", GrantStatus::Open),
        ]);
        let outcome = filter_candidates(
            &storage,
            &profile("tokyo", &["it"]),
            &default_relaxation_order(),
            today(),
        )
        .unwrap();
        assert_eq!(outcome.grants.len(), 1);
        assert_eq!(outcome.grants[0].id, "g1");
        assert!(outcome.relaxed.is_empty());
    }

    #[test]
    fn test_relaxation_stops_at_first_nonempty() {
        // No IT grants anywhere; dropping category yields the region match.
        let (storage, _dir) = storage_with(&[grant("g1", "tokyo", "hiring", GrantStatus::Open)]);
        let outcome = filter_candidates(
            &storage,
            &profile("tokyo", &["it"]),
            &default_relaxation_order(),
            today(),
        )
        .unwrap();
        assert_eq!(outcome.grants.len(), 1);
        assert_eq!(outcome.relaxed, vec![ConstraintKind::Category]);
    }

    #[test]
    fn test_relaxation_is_cumulative() {
        // Only an Osaka hiring grant exists; category and region must both go.
        let (storage, _dir) = storage_with(&[grant("g1", "osaka", "hiring", GrantStatus::Open)]);
        let outcome = filter_candidates(
            &storage,
            &profile("tokyo", &["it"]),
            &default_relaxation_order(),
            today(),
        )
        .unwrap();
        assert_eq!(outcome.grants.len(), 1);
        assert_eq!(
            outcome.relaxed,
            vec![ConstraintKind::Category, ConstraintKind::Region]
        );
    }

    #[test]
    fn test_status_never_relaxed() {
        let (storage, _dir) = storage_with(&[grant("g1", "tokyo", "it", GrantStatus::Closed)]);
        let outcome = filter_candidates(
            &storage,
            &profile("tokyo", &["it"]),
            &default_relaxation_order(),
            today(),
        )
        .unwrap();
        // Even with every relaxable constraint gone, closed grants stay out.
        assert!(outcome.grants.is_empty());
    }

    #[test]
    fn test_urgent_excludes_upcoming() {
        let (storage, _dir) = storage_with(&[
            grant("g1", "tokyo", "it", GrantStatus::Open),
            grant("g2", "tokyo", "it", GrantStatus::Upcoming),
        ]);
        let mut urgent = profile("tokyo", &["it"]);
        urgent.urgency = Some("within_1_month".into());
        let mut relaxed_profile = profile("tokyo", &["it"]);
        relaxed_profile.urgency = Some("anytime".into());

        // Deadline window from within_1_month: extend the grant deadline so
        // the date constraint is satisfiable.
        let outcome =
            filter_candidates(&storage, &relaxed_profile, &default_relaxation_order(), today())
                .unwrap();
        assert_eq!(outcome.grants.len(), 2);

        let outcome =
            filter_candidates(&storage, &urgent, &default_relaxation_order(), today()).unwrap();
        // g1's deadline (Oct 31) is outside the 30-day window, so the
        // deadline constraint relaxes, but the upcoming grant stays excluded.
        assert_eq!(outcome.grants.len(), 1);
        assert_eq!(outcome.grants[0].id, "g1");
        assert_eq!(outcome.relaxed, vec![ConstraintKind::Deadline]);
    }

    #[test]
    fn test_undeclared_constraints_skip_relaxation() {
        let (storage, _dir) = storage_with(&[grant("g1", "osaka", "it", GrantStatus::Open)]);
        // Only region declared; other dimensions were never active so only
        // region shows up in the relaxed list.
        let outcome = filter_candidates(
            &storage,
            &profile("tokyo", &[]),
            &default_relaxation_order(),
            today(),
        )
        .unwrap();
        assert_eq!(outcome.relaxed, vec![ConstraintKind::Region]);
        assert_eq!(outcome.grants.len(), 1);
    }

    #[test]
    fn test_empty_even_after_full_relaxation() {
        let (storage, _dir) = storage_with(&[]);
        let outcome = filter_candidates(
            &storage,
            &profile("tokyo", &["it"]),
            &default_relaxation_order(),
            today(),
        )
        .unwrap();
        assert!(outcome.grants.is_empty());
    }

    #[test]
    fn test_constraint_kind_serde() {
        let order = default_relaxation_order();
        let yaml = serde_yaml::to_string(&order).unwrap();
        let back: Vec<ConstraintKind> = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, order);
        assert!(yaml.contains("deadline"));
    }
}
