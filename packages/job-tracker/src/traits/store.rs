//! Storage trait for postings.
//!
//! The store is the persistence boundary. Every source run ends in a single
//! [`PostingStore::commit`] that applies the upserts and closures together,
//! so a failed commit leaves the source's prior state untouched.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use crate::error::StoreResult;
use crate::types::posting::{JobPosting, PostingIdentity, PostingStatus};

/// Everything one source run wants to write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// New, updated and re-observed postings
    pub upserts: Vec<JobPosting>,

    /// Active postings that disappeared from the source
    pub closed: Vec<PostingIdentity>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.closed.is_empty()
    }
}

/// Filter for listing stored postings.
#[derive(Debug, Clone, Default)]
pub struct PostingQuery {
    pub source_id: Option<String>,
    pub status: Option<PostingStatus>,
    /// Only postings first seen at or after this instant
    pub first_seen_since: Option<DateTime<Utc>>,
}

impl PostingQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn with_status(mut self, status: PostingStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Postings first seen in the last `days` days relative to `now`.
    ///
    /// A window reaching past the representable range covers everything.
    pub fn seen_within_days(mut self, days: i64, now: DateTime<Utc>) -> Self {
        let since = TimeDelta::try_days(days).and_then(|window| now.checked_sub_signed(window));
        self.first_seen_since = Some(since.unwrap_or(DateTime::<Utc>::MIN_UTC));
        self
    }

    pub fn matches(&self, posting: &JobPosting) -> bool {
        if let Some(source_id) = &self.source_id {
            if &posting.source_id != source_id {
                return false;
            }
        }
        if let Some(status) = self.status {
            if posting.status != status {
                return false;
            }
        }
        if let Some(since) = self.first_seen_since {
            if posting.first_seen_at < since {
                return false;
            }
        }
        true
    }
}

/// Persistent posting store, partitioned by `source_id`.
#[async_trait]
pub trait PostingStore: Send + Sync {
    /// Every known posting of a source, active and closed.
    async fn get_postings(&self, source_id: &str) -> StoreResult<Vec<JobPosting>>;

    /// Active postings of a source.
    async fn get_active_postings(&self, source_id: &str) -> StoreResult<Vec<JobPosting>> {
        Ok(self
            .get_postings(source_id)
            .await?
            .into_iter()
            .filter(JobPosting::is_active)
            .collect())
    }

    /// Apply upserts and closures for one source atomically.
    async fn commit(&self, source_id: &str, changes: &ChangeSet) -> StoreResult<()>;

    /// List postings matching a filter, newest first-seen first.
    async fn query(&self, query: &PostingQuery) -> StoreResult<Vec<JobPosting>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn posting(source_id: &str, status: PostingStatus, first_seen_at: DateTime<Utc>) -> JobPosting {
        JobPosting {
            source_id: source_id.to_string(),
            external_id: "1".to_string(),
            title: "Engineer".to_string(),
            location: None,
            url: "https://example.com/1".to_string(),
            posted_at: first_seen_at,
            department: None,
            description: None,
            first_seen_at,
            last_seen_at: first_seen_at,
            status,
            raw_fingerprint: "f".to_string(),
        }
    }

    #[test]
    fn test_query_matches_all_filters() {
        let now = Utc.with_ymd_and_hms(2025, 4, 10, 0, 0, 0).unwrap();
        let recent = posting("micron", PostingStatus::Active, now - TimeDelta::hours(12));
        let old = posting("micron", PostingStatus::Active, now - TimeDelta::days(5));
        let closed = posting("micron", PostingStatus::Closed, now);

        let query = PostingQuery::new()
            .for_source("micron")
            .with_status(PostingStatus::Active)
            .seen_within_days(1, now);

        assert!(query.matches(&recent));
        assert!(!query.matches(&old));
        assert!(!query.matches(&closed));
        assert!(!query.matches(&posting("asml", PostingStatus::Active, now)));
        assert!(PostingQuery::new().matches(&old));
    }

    #[test]
    fn test_huge_day_window_matches_everything() {
        let now = Utc.with_ymd_and_hms(2025, 4, 10, 0, 0, 0).unwrap();
        let ancient = posting("micron", PostingStatus::Active, Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap());

        let query = PostingQuery::new().seen_within_days(i64::MAX, now);

        assert_eq!(query.first_seen_since, Some(DateTime::<Utc>::MIN_UTC));
        assert!(query.matches(&ancient));
    }
}
