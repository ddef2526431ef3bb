//! Change detection between stored postings and fresh candidates.
//!
//! [`reconcile`] is pure: it takes a source's prior postings (active and
//! closed) plus the candidates extracted in this run, and classifies every
//! identity as New, Updated, Unchanged or Closed. Writing the result is the
//! pipeline's job, via [`Reconciliation::changeset`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ValidationError;
use crate::traits::store::ChangeSet;
use crate::types::posting::{JobPosting, JobPostingCandidate, NormalizedPosting, PostingIdentity, PostingStatus};

/// Two candidates in one run shared an identity. The later one was kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateCandidateWarning {
    pub identity: PostingIdentity,
    /// Position of the discarded candidate in the input
    pub discarded_index: usize,
    /// Position of the candidate that replaced it
    pub kept_index: usize,
}

/// A candidate that failed normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedCandidate {
    pub index: usize,
    pub error: ValidationError,
}

/// Classification of one source run. The four posting lists are disjoint.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub new: Vec<JobPosting>,
    /// Content changed, or a closed posting reappeared
    pub updated: Vec<JobPosting>,
    /// Same fingerprint; only `last_seen_at` moved
    pub unchanged: Vec<JobPosting>,
    /// Previously active, absent from this run
    pub closed: Vec<JobPosting>,
    pub warnings: Vec<DuplicateCandidateWarning>,
    pub rejected: Vec<RejectedCandidate>,
}

impl Reconciliation {
    /// Writes needed to persist this classification.
    pub fn changeset(&self) -> ChangeSet {
        ChangeSet {
            upserts: self
                .new
                .iter()
                .chain(&self.updated)
                .chain(&self.unchanged)
                .cloned()
                .collect(),
            closed: self.closed.iter().map(JobPosting::identity).collect(),
        }
    }
}

/// Classify `candidates` against the source's `prior` postings.
///
/// Candidates that fail validation are reported in `rejected` and take no
/// part in closure detection beyond being absent. Duplicate identities keep
/// the last occurrence.
pub fn reconcile(
    source_id: &str,
    prior: Vec<JobPosting>,
    candidates: &[JobPostingCandidate],
    now: DateTime<Utc>,
) -> Reconciliation {
    let mut result = Reconciliation::default();

    let mut seen: IndexMap<PostingIdentity, (usize, NormalizedPosting)> = IndexMap::new();
    for (index, candidate) in candidates.iter().enumerate() {
        let normalized = match NormalizedPosting::from_candidate(source_id, candidate) {
            Ok(normalized) => normalized,
            Err(error) => {
                warn!(source_id, index, error = %error, "Rejected candidate");
                result.rejected.push(RejectedCandidate { index, error });
                continue;
            }
        };

        let identity = normalized.identity.clone();
        if let Some((discarded_index, _)) = seen.shift_remove(&identity) {
            warn!(source_id, identity = %identity, discarded_index, kept_index = index, "Duplicate candidate");
            result.warnings.push(DuplicateCandidateWarning {
                identity: identity.clone(),
                discarded_index,
                kept_index: index,
            });
        }
        seen.insert(identity, (index, normalized));
    }

    let mut prior: HashMap<PostingIdentity, JobPosting> = prior
        .into_iter()
        .filter(|p| p.source_id == source_id)
        .map(|p| (p.identity(), p))
        .collect();

    for (identity, (_, normalized)) in seen {
        match prior.remove(&identity) {
            None => result.new.push(JobPosting::first_observed(normalized, now)),
            Some(mut existing) => {
                let reopened = existing.status == PostingStatus::Closed;
                if reopened || existing.raw_fingerprint != normalized.raw_fingerprint {
                    existing.apply_observation(normalized, now);
                    result.updated.push(existing);
                } else {
                    existing.last_seen_at = now;
                    result.unchanged.push(existing);
                }
            }
        }
    }

    let mut closed: Vec<JobPosting> = prior
        .into_values()
        .filter(JobPosting::is_active)
        .map(|mut posting| {
            posting.status = PostingStatus::Closed;
            posting
        })
        .collect();
    closed.sort_by(|a, b| a.external_id.cmp(&b.external_id));
    result.closed = closed;

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn t(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, day, 9, 0, 0).unwrap()
    }

    fn candidate(id: &str, title: &str) -> JobPostingCandidate {
        JobPostingCandidate::new(title, format!("https://careers.example.com/jobs/{}", id)).with_external_id(id)
    }

    /// Apply a change set the way a store would.
    fn apply(prior: Vec<JobPosting>, changes: &ChangeSet) -> Vec<JobPosting> {
        let mut map: IndexMap<PostingIdentity, JobPosting> =
            prior.into_iter().map(|p| (p.identity(), p)).collect();
        for posting in &changes.upserts {
            map.insert(posting.identity(), posting.clone());
        }
        for identity in &changes.closed {
            if let Some(p) = map.get_mut(identity) {
                p.status = PostingStatus::Closed;
            }
        }
        map.into_values().collect()
    }

    #[test]
    fn test_new_then_unchanged_then_closed() {
        let first = reconcile("a", vec![], &[candidate("1", "Engineer")], t(1));
        assert_eq!(first.new.len(), 1);
        assert!(first.closed.is_empty());
        let stored = apply(vec![], &first.changeset());

        let second = reconcile("a", stored.clone(), &[candidate("1", "Engineer")], t(2));
        assert!(second.new.is_empty());
        assert!(second.updated.is_empty());
        assert_eq!(second.unchanged.len(), 1);
        assert_eq!(second.unchanged[0].last_seen_at, t(2));
        assert_eq!(second.unchanged[0].first_seen_at, t(1));
        let stored = apply(stored, &second.changeset());

        let third = reconcile("a", stored, &[], t(3));
        assert_eq!(third.closed.len(), 1);
        assert_eq!(third.closed[0].status, PostingStatus::Closed);
        assert_eq!(third.changeset().closed, vec![PostingIdentity::new("a", "1")]);
    }

    #[test]
    fn test_changed_content_is_updated() {
        let stored = apply(vec![], &reconcile("a", vec![], &[candidate("1", "Engineer")], t(1)).changeset());

        let result = reconcile("a", stored, &[candidate("1", "Senior Engineer")], t(2));

        assert_eq!(result.updated.len(), 1);
        let updated = &result.updated[0];
        assert_eq!(updated.title, "Senior Engineer");
        assert_eq!(updated.first_seen_at, t(1));
        assert_eq!(updated.last_seen_at, t(2));
    }

    #[test]
    fn test_reopened_posting_is_updated_not_new() {
        let stored = apply(vec![], &reconcile("a", vec![], &[candidate("1", "Engineer")], t(1)).changeset());
        let stored = apply(stored.clone(), &reconcile("a", stored, &[], t(2)).changeset());
        assert_eq!(stored[0].status, PostingStatus::Closed);

        let result = reconcile("a", stored, &[candidate("1", "Engineer")], t(3));

        assert!(result.new.is_empty());
        assert_eq!(result.updated.len(), 1);
        assert_eq!(result.updated[0].status, PostingStatus::Active);
        assert_eq!(result.updated[0].first_seen_at, t(1));
    }

    #[test]
    fn test_closed_postings_stay_closed_when_absent() {
        let stored = apply(vec![], &reconcile("a", vec![], &[candidate("1", "Engineer")], t(1)).changeset());
        let stored = apply(stored.clone(), &reconcile("a", stored, &[], t(2)).changeset());

        let result = reconcile("a", stored, &[], t(3));
        assert!(result.closed.is_empty());
    }

    #[test]
    fn test_duplicate_keeps_later_candidate() {
        let result = reconcile(
            "a",
            vec![],
            &[candidate("1", "First"), candidate("2", "Other"), candidate("1", "Second")],
            t(1),
        );

        assert_eq!(result.new.len(), 2);
        let kept = result.new.iter().find(|p| p.external_id == "1").unwrap();
        assert_eq!(kept.title, "Second");
        assert_eq!(
            result.warnings,
            vec![DuplicateCandidateWarning {
                identity: PostingIdentity::new("a", "1"),
                discarded_index: 0,
                kept_index: 2,
            }]
        );
    }

    #[test]
    fn test_invalid_candidates_rejected_others_kept() {
        let mut blank = candidate("2", "x");
        blank.title = "   ".to_string();

        let result = reconcile("a", vec![], &[candidate("1", "Engineer"), blank], t(1));

        assert_eq!(result.new.len(), 1);
        assert_eq!(
            result.rejected,
            vec![RejectedCandidate { index: 1, error: ValidationError::EmptyTitle }]
        );
    }

    #[test]
    fn test_other_sources_in_prior_are_ignored() {
        let foreign = apply(vec![], &reconcile("b", vec![], &[candidate("9", "Other")], t(1)).changeset());

        let result = reconcile("a", foreign, &[], t(2));
        assert!(result.closed.is_empty());
    }

    #[test]
    fn test_missing_posted_at_keeps_stored_value() {
        let posted = t(1) - Duration::days(7);
        let stored = apply(
            vec![],
            &reconcile("a", vec![], &[candidate("1", "Engineer").with_posted_at(posted)], t(1)).changeset(),
        );

        let result = reconcile("a", stored, &[candidate("1", "Engineer II")], t(2));
        assert_eq!(result.updated[0].posted_at, posted);
    }

    fn candidates_strategy() -> impl Strategy<Value = Vec<JobPostingCandidate>> {
        prop::collection::vec(("[a-e]", "[A-Za-z ]{1,12}"), 0..12).prop_map(|items| {
            items
                .into_iter()
                .map(|(id, title)| candidate(&id, &format!("Job {}", title)))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_second_identical_run_is_all_unchanged(
            prior_run in candidates_strategy(),
            run in candidates_strategy(),
        ) {
            let stored = apply(vec![], &reconcile("a", vec![], &prior_run, t(1)).changeset());
            let first = reconcile("a", stored.clone(), &run, t(2));
            let stored = apply(stored, &first.changeset());

            let second = reconcile("a", stored, &run, t(3));

            prop_assert!(second.new.is_empty());
            prop_assert!(second.updated.is_empty());
            prop_assert!(second.closed.is_empty());
            prop_assert_eq!(second.unchanged.len(), first.changeset().upserts.len());
        }

        #[test]
        fn prop_first_seen_is_stable(
            first_run in candidates_strategy(),
            second_run in candidates_strategy(),
        ) {
            let first = reconcile("a", vec![], &first_run, t(1));
            let stored = apply(vec![], &first.changeset());
            let second = reconcile("a", stored.clone(), &second_run, t(2));

            for posting in second.updated.iter().chain(&second.unchanged) {
                let before = stored.iter().find(|p| p.identity() == posting.identity()).unwrap();
                prop_assert_eq!(posting.first_seen_at, before.first_seen_at);
            }
            for posting in &second.new {
                prop_assert!(stored.iter().all(|p| p.identity() != posting.identity()));
            }
        }
    }
}
