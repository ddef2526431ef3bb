//! Keyed async locks, one per source.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Serializes reconcile + persist for the same `source_id` within a process.
#[derive(Default)]
pub struct SourceLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `source_id`. Released when the guard drops.
    pub async fn acquire(&self, source_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(source_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_source_is_exclusive() {
        let locks = SourceLocks::new();
        let guard = locks.acquire("micron").await;

        let blocked = tokio::time::timeout(Duration::from_millis(20), locks.acquire("micron")).await;
        assert!(blocked.is_err());

        drop(guard);
        let reacquired = tokio::time::timeout(Duration::from_millis(20), locks.acquire("micron")).await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn test_different_sources_do_not_block() {
        let locks = SourceLocks::new();
        let _micron = locks.acquire("micron").await;

        let asml = tokio::time::timeout(Duration::from_millis(20), locks.acquire("asml")).await;
        assert!(asml.is_ok());
    }
}
