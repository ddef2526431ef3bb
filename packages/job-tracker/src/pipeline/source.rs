//! Processing of a single source: fetch → extract → reconcile → persist.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Pipeline;
use crate::error::{ExtractionError, FetchError, FetchErrorKind};
use crate::reconcile::reconcile;
use crate::traits::adapter::SourceAdapter;
use crate::traits::store::PostingStore;
use crate::traits::transport::{RawContent, Transport};
use crate::types::config::FetchOptions;
use crate::types::posting::JobPostingCandidate;
use crate::types::summary::{FailureKind, SourceIssue, SourceReport, SourceState};

/// A source's report plus its state machine.
struct SourceRun {
    report: SourceReport,
}

impl SourceRun {
    fn new(source_id: &str) -> Self {
        Self {
            report: SourceReport::new(source_id),
        }
    }

    fn source_id(&self) -> &str {
        &self.report.source_id
    }

    fn transition(&mut self, next: SourceState) {
        debug_assert!(
            self.report.state.can_transition_to(&next),
            "illegal transition {:?} -> {:?}",
            self.report.state,
            next
        );
        debug!(
            source_id = %self.report.source_id,
            from = self.report.state.label(),
            to = next.label(),
            "Source state transition"
        );
        self.report.state = next;
    }

    fn fail(mut self, kind: FailureKind) -> SourceReport {
        self.transition(SourceState::Failed { kind });
        warn!(source_id = %self.report.source_id, kind = ?kind, "Source failed");
        self.report
    }

    fn cancelled(mut self) -> SourceReport {
        self.report.errors.push(SourceIssue::Cancelled);
        self.fail(FailureKind::Cancelled)
    }
}

/// Pages fetched for one source.
struct PageWalk {
    pages: Vec<RawContent>,
    /// Set when the walk stopped while the adapter still had pages to give
    truncated: Option<String>,
}

/// Where a candidate came from, for error reporting.
#[derive(Debug, Clone, Copy)]
struct Position {
    page: usize,
    index: usize,
}

impl<T: Transport, S: PostingStore> Pipeline<T, S> {
    pub(super) async fn run_source(
        &self,
        source_id: &str,
        adapter: Arc<dyn SourceAdapter>,
        cancel: &CancellationToken,
    ) -> SourceReport {
        let mut run = SourceRun::new(source_id);
        if cancel.is_cancelled() {
            return run.cancelled();
        }

        // Fetching
        run.transition(SourceState::Fetching);
        let options = self.effective_options(source_id, adapter.as_ref());
        let walk = self.fetch_pages(source_id, adapter.as_ref(), &options, cancel).await;
        let PageWalk { pages, truncated } = match walk {
            Ok(walk) => walk,
            Err(err) => {
                run.report.errors.push(SourceIssue::fetch(&err));
                let kind = match err.kind {
                    FetchErrorKind::Cancelled => FailureKind::Cancelled,
                    kind => FailureKind::Fetch { kind },
                };
                return run.fail(kind);
            }
        };
        run.report.pages_fetched = pages.len();
        if let Some(message) = &truncated {
            run.report.errors.push(SourceIssue::Truncated {
                pages: pages.len(),
                message: message.clone(),
            });
        }

        if cancel.is_cancelled() {
            return run.cancelled();
        }

        // Extracting
        run.transition(SourceState::Extracting);
        let mut candidates: Vec<JobPostingCandidate> = Vec::new();
        let mut positions: Vec<Position> = Vec::new();
        for (page, raw) in pages.iter().enumerate() {
            let extraction = match adapter.extract(raw) {
                Ok(extraction) => extraction,
                Err(err) => {
                    warn!(source_id, page, url = %raw.url, error = %err, "Unrecognized page");
                    run.report.errors.push(SourceIssue::extraction(page, &err));
                    return run.fail(FailureKind::Extraction);
                }
            };
            for err in &extraction.errors {
                if let ExtractionError::PerItem { index, reason } = err {
                    warn!(source_id, page, index, reason = %reason, "Skipped listing");
                }
                run.report.errors.push(SourceIssue::extraction(page, err));
            }
            positions.extend((0..extraction.candidates.len()).map(|index| Position { page, index }));
            candidates.extend(extraction.candidates);
        }
        debug!(source_id, candidates = candidates.len(), "Extracted candidates");

        if cancel.is_cancelled() {
            return run.cancelled();
        }

        // Reconciling. The source lock spans load → reconcile → commit.
        run.transition(SourceState::Reconciling);
        let _guard = tokio::select! {
            guard = self.locks.acquire(source_id) => guard,
            _ = cancel.cancelled() => return run.cancelled(),
        };

        let prior = match self.store.get_postings(source_id).await {
            Ok(prior) => prior,
            Err(err) => {
                run.report.errors.push(SourceIssue::persistence(&err));
                return run.fail(FailureKind::Persistence);
            }
        };
        let mut reconciliation = reconcile(source_id, prior, &candidates, Utc::now());

        // Postings on unfetched pages were not observed, so nothing closes
        if truncated.is_some() && !reconciliation.closed.is_empty() {
            info!(
                source_id,
                withheld = reconciliation.closed.len(),
                "Partial page walk, not closing postings"
            );
            reconciliation.closed.clear();
        }

        for rejected in &reconciliation.rejected {
            let position = positions.get(rejected.index).copied().unwrap_or(Position {
                page: 0,
                index: rejected.index,
            });
            run.report.errors.push(SourceIssue::validation(
                position.page,
                position.index,
                &rejected.error,
            ));
        }
        for warning in &reconciliation.warnings {
            run.report.errors.push(SourceIssue::DuplicateCandidate {
                external_id: warning.identity.external_id.clone(),
                discarded_index: warning.discarded_index,
            });
        }

        if cancel.is_cancelled() {
            return run.cancelled();
        }

        // Persisting. Once started, the commit runs to completion.
        run.transition(SourceState::Persisting);
        if let Err(err) = self.store.commit(source_id, &reconciliation.changeset()).await {
            run.report.errors.push(SourceIssue::persistence(&err));
            return run.fail(FailureKind::Persistence);
        }

        run.report.new_count = reconciliation.new.len();
        run.report.updated_count = reconciliation.updated.len();
        run.report.unchanged_count = reconciliation.unchanged.len();
        run.report.closed_count = reconciliation.closed.len();
        run.report.new_postings = reconciliation.new;

        let terminal = if run.report.has_errors() {
            SourceState::PartialFailure
        } else {
            SourceState::Success
        };
        run.transition(terminal);

        info!(
            source_id = run.source_id(),
            state = terminal.label(),
            pages = run.report.pages_fetched,
            new = run.report.new_count,
            updated = run.report.updated_count,
            unchanged = run.report.unchanged_count,
            closed = run.report.closed_count,
            "Source finished"
        );
        run.report
    }

    /// Walk the adapter's pages until it stops, repeats itself, or the page cap.
    async fn fetch_pages(
        &self,
        source_id: &str,
        adapter: &dyn SourceAdapter,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> Result<PageWalk, FetchError> {
        let mut pages = Vec::new();
        let mut request = adapter.first_request();

        let truncated = loop {
            let raw = self.fetcher.fetch(source_id, &request, options, cancel).await?;
            let next = adapter.next_request(&request, &raw);
            pages.push(raw);

            let Some(next) = next else {
                break None;
            };
            if pages.len() >= self.config.max_pages {
                warn!(source_id, max_pages = self.config.max_pages, "Page limit reached");
                break Some(format!("page limit of {} reached", self.config.max_pages));
            }
            if next == request {
                warn!(source_id, url = %next.url, "Adapter repeated its request, stopping");
                break Some(format!("adapter repeated request for {}", next.url));
            }
            request = next;
        };

        Ok(PageWalk { pages, truncated })
    }

    /// Configured options for the source, with the adapter's headers filled
    /// in underneath the configured ones.
    fn effective_options(&self, source_id: &str, adapter: &dyn SourceAdapter) -> FetchOptions {
        let mut options = self
            .config
            .fetch_overrides
            .get(source_id)
            .cloned()
            .unwrap_or_else(|| self.config.default_fetch.clone());

        if let Some(preferred) = adapter.fetch_options() {
            for (name, value) in preferred.headers {
                options.headers.entry(name).or_insert(value);
            }
        }
        options
    }
}
