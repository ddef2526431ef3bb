//! Pipeline orchestrator - runs every registered source and reports.
//!
//! Each source moves through
//! `Pending → Fetching → Extracting → Reconciling → Persisting → Success`
//! (or `PartialFailure`/`Failed`). Sources run concurrently up to
//! `max_concurrent_sources`; a failure in one never blocks the others, and a
//! source that fails before persisting leaves its stored postings untouched.
//!
//! # Example
//!
//! ```ignore
//! let pipeline = Pipeline::new(registry, HttpTransport::new()?, store, PipelineConfig::default())?;
//! let summary = pipeline.run(&CancellationToken::new()).await;
//! println!("{} new postings", summary.total_new());
//! ```

mod locks;
mod source;

pub use locks::SourceLocks;

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{ConfigurationError, NotFoundError};
use crate::fetch::Fetcher;
use crate::registry::AdapterRegistry;
use crate::traits::adapter::SourceAdapter;
use crate::traits::store::PostingStore;
use crate::traits::transport::Transport;
use crate::types::config::PipelineConfig;
use crate::types::summary::RunSummary;

pub struct Pipeline<T: Transport, S: PostingStore> {
    registry: Arc<AdapterRegistry>,
    fetcher: Fetcher<T>,
    store: Arc<S>,
    config: PipelineConfig,
    locks: SourceLocks,
}

impl<T: Transport, S: PostingStore> Pipeline<T, S> {
    /// Build a pipeline. Fails if the configuration is invalid.
    pub fn new(
        registry: Arc<AdapterRegistry>,
        transport: T,
        store: Arc<S>,
        config: PipelineConfig,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self {
            registry,
            fetcher: Fetcher::new(transport),
            store,
            config,
            locks: SourceLocks::new(),
        })
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every registered source.
    pub async fn run(&self, cancel: &CancellationToken) -> RunSummary {
        let sources = self
            .registry
            .list_sources()
            .into_iter()
            .filter_map(|id| self.registry.get(&id).ok().map(|adapter| (id, adapter)))
            .collect();
        self.run_resolved(sources, cancel).await
    }

    /// Run a subset of sources, in the order given.
    ///
    /// Every id is resolved before anything is fetched, so an unknown id
    /// fails the call without side effects.
    pub async fn run_sources(
        &self,
        source_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<RunSummary, NotFoundError> {
        let sources = source_ids
            .iter()
            .map(|id| Ok((id.clone(), self.registry.get(id)?)))
            .collect::<Result<Vec<_>, NotFoundError>>()?;
        Ok(self.run_resolved(sources, cancel).await)
    }

    async fn run_resolved(
        &self,
        sources: Vec<(String, Arc<dyn SourceAdapter>)>,
        cancel: &CancellationToken,
    ) -> RunSummary {
        let mut summary = RunSummary::new(Utc::now());
        info!(run_id = %summary.run_id, sources = sources.len(), "Starting run");

        // Child token so a run timeout never cancels the caller's token
        let run_cancel = cancel.child_token();
        let timer = self.config.run_timeout.map(|timeout| {
            let token = run_cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                warn!(timeout_secs = timeout.as_secs(), "Run timeout reached, cancelling");
                token.cancel();
            })
        });

        let semaphore = Semaphore::new(self.config.max_concurrent_sources.max(1));
        let runs = sources.into_iter().map(|(source_id, adapter)| {
            let semaphore = &semaphore;
            let run_cancel = &run_cancel;
            async move {
                // The semaphore is never closed, so acquire cannot fail
                let _permit = semaphore.acquire().await.ok();
                self.run_source(&source_id, adapter, run_cancel).await
            }
        });

        for report in join_all(runs).await {
            summary.insert(report);
        }

        if let Some(timer) = timer {
            timer.abort();
        }
        summary.finished_at = Some(Utc::now());

        info!(
            run_id = %summary.run_id,
            new = summary.total_new(),
            closed = summary.total_closed(),
            failed = summary.failed_sources().len(),
            "Run complete"
        );
        summary
    }
}
