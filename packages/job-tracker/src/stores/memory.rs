//! In-memory posting store for testing and development.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::error::{PersistenceError, StoreResult};
use crate::traits::store::{ChangeSet, PostingQuery, PostingStore};
use crate::types::posting::{JobPosting, PostingIdentity, PostingStatus};

/// In-memory posting storage.
///
/// Useful for testing and development. Data is lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    postings: RwLock<HashMap<PostingIdentity, JobPosting>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing postings.
    pub fn with_postings(self, postings: impl IntoIterator<Item = JobPosting>) -> Self {
        if let Ok(mut map) = self.postings.write() {
            for posting in postings {
                map.insert(posting.identity(), posting);
            }
        }
        self
    }

    /// Number of stored postings across all sources.
    pub fn len(&self) -> usize {
        self.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every stored posting, ordered by identity.
    pub fn snapshot(&self) -> Vec<JobPosting> {
        let mut all: Vec<JobPosting> = self
            .read()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        all.sort_by(|a, b| a.identity().cmp(&b.identity()));
        all
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<PostingIdentity, JobPosting>>> {
        self.postings
            .read()
            .map_err(|_| PersistenceError::Unavailable("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, HashMap<PostingIdentity, JobPosting>>> {
        self.postings
            .write()
            .map_err(|_| PersistenceError::Unavailable("memory store lock poisoned".to_string()))
    }
}

/// Reject change sets that reach outside their source before writing anything.
pub(crate) fn check_partition(source_id: &str, changes: &ChangeSet) -> StoreResult<()> {
    let foreign = changes
        .upserts
        .iter()
        .map(|p| p.source_id.as_str())
        .chain(changes.closed.iter().map(|id| id.source_id.as_str()))
        .find(|id| *id != source_id);

    match foreign {
        Some(other) => Err(PersistenceError::Corrupt(format!(
            "change set for {} touches source {}",
            source_id, other
        ))),
        None => Ok(()),
    }
}

#[async_trait]
impl PostingStore for MemoryStore {
    async fn get_postings(&self, source_id: &str) -> StoreResult<Vec<JobPosting>> {
        let mut postings: Vec<JobPosting> = self
            .read()?
            .values()
            .filter(|p| p.source_id == source_id)
            .cloned()
            .collect();
        postings.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        Ok(postings)
    }

    async fn commit(&self, source_id: &str, changes: &ChangeSet) -> StoreResult<()> {
        check_partition(source_id, changes)?;

        // One write guard covers the whole change set
        let mut map = self.write()?;
        for posting in &changes.upserts {
            map.insert(posting.identity(), posting.clone());
        }
        for identity in &changes.closed {
            if let Some(posting) = map.get_mut(identity) {
                posting.status = PostingStatus::Closed;
            }
        }
        Ok(())
    }

    async fn query(&self, query: &PostingQuery) -> StoreResult<Vec<JobPosting>> {
        let mut postings: Vec<JobPosting> = self
            .read()?
            .values()
            .filter(|p| query.matches(p))
            .cloned()
            .collect();
        postings.sort_by_key(|p| (Reverse(p.first_seen_at), p.source_id.clone(), p.external_id.clone()));
        Ok(postings)
    }
}
