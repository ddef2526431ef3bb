//! End-to-end pipeline scenarios against mock transports and real stores.

use std::sync::Arc;
use std::time::Duration;

use job_tracker::testing::{FailingStore, MockTransport, StaticAdapter};
use job_tracker::{
    AdapterRegistry, Backoff, ExtractionError, Extraction, FailureKind, FetchErrorKind,
    FetchOptions, JobPostingCandidate, MemoryStore, MicronAdapter, Pipeline, PipelineConfig,
    PostingStatus, PostingStore, RawContent, SourceAdapter, SourceIssue, SourceState, SqliteStore,
    TransportError,
};
use tokio_util::sync::CancellationToken;

fn job(id: &str, title: &str) -> JobPostingCandidate {
    JobPostingCandidate::new(title, format!("https://careers.example.com/jobs/{}", id)).with_external_id(id)
}

fn fast_config() -> PipelineConfig {
    PipelineConfig::new().with_default_fetch(
        FetchOptions::new()
            .with_retries(2)
            .with_backoff(Backoff::Fixed {
                delay: Duration::from_millis(1),
            })
            .with_rate_limit(None),
    )
}

fn ok_transport() -> MockTransport {
    MockTransport::new().with_default_response(RawContent::ok("", ""))
}

fn registry(adapters: &[(&str, &StaticAdapter)]) -> Arc<AdapterRegistry> {
    let mut registry = AdapterRegistry::new();
    for (id, adapter) in adapters {
        registry.register(*id, Arc::new((*adapter).clone())).unwrap();
    }
    Arc::new(registry)
}

#[tokio::test]
async fn new_then_unchanged_then_closed() {
    let a = StaticAdapter::new("a").with_candidates(vec![job("1", "Engineer")]);
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::new(registry(&[("a", &a)]), ok_transport(), store.clone(), fast_config()).unwrap();
    let cancel = CancellationToken::new();

    let first = pipeline.run(&cancel).await;
    let report = first.get("a").unwrap();
    assert_eq!(report.state, SourceState::Success);
    assert_eq!((report.new_count, report.closed_count), (1, 0));
    assert_eq!(first.new_postings().count(), 1);

    let second = pipeline.run(&cancel).await;
    let report = second.get("a").unwrap();
    assert_eq!(
        (report.new_count, report.updated_count, report.unchanged_count),
        (0, 0, 1)
    );

    a.set_candidates(vec![]);
    let third = pipeline.run(&cancel).await;
    let report = third.get("a").unwrap();
    assert_eq!(report.closed_count, 1);
    assert_eq!(store.get_active_postings("a").await.unwrap().len(), 0);
    assert_eq!(store.get_postings("a").await.unwrap()[0].status, PostingStatus::Closed);
}

#[tokio::test]
async fn exhausted_fetch_leaves_source_untouched_and_others_run() {
    let a = StaticAdapter::new("a").with_candidates(vec![job("1", "Engineer")]);
    let b = StaticAdapter::new("b").with_candidates(vec![job("7", "Technician")]);
    let transport = ok_transport();
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::new(
        registry(&[("a", &a), ("b", &b)]),
        transport.clone(),
        store.clone(),
        fast_config(),
    )
    .unwrap();
    let cancel = CancellationToken::new();

    pipeline.run(&cancel).await;
    let before = store.get_postings("b").await.unwrap();

    transport.set_fallback(b.page_url(0), RawContent::new(b.page_url(0), 503, "down"));
    b.set_candidates(vec![]);
    a.set_candidates(vec![job("1", "Engineer"), job("2", "Designer")]);
    let summary = pipeline.run(&cancel).await;

    let report_b = summary.get("b").unwrap();
    assert_eq!(
        report_b.state,
        SourceState::Failed {
            kind: FailureKind::Fetch {
                kind: FetchErrorKind::Exhausted
            }
        }
    );
    assert_eq!(report_b.closed_count, 0);
    assert_eq!(store.get_postings("b").await.unwrap(), before);
    assert_eq!(summary.failed_sources(), vec!["b"]);

    assert_eq!(summary.get("a").unwrap().state, SourceState::Success);
    assert_eq!(summary.get("a").unwrap().new_count, 1);
}

#[tokio::test]
async fn permanent_fetch_failure_is_not_retried() {
    let a = StaticAdapter::new("a");
    let transport = MockTransport::new().with_fallback(a.page_url(0), RawContent::new(a.page_url(0), 404, "gone"));
    let pipeline = Pipeline::new(
        registry(&[("a", &a)]),
        transport.clone(),
        Arc::new(MemoryStore::new()),
        fast_config(),
    )
    .unwrap();

    let summary = pipeline.run(&CancellationToken::new()).await;

    assert_eq!(
        summary.get("a").unwrap().state,
        SourceState::Failed {
            kind: FailureKind::Fetch {
                kind: FetchErrorKind::Permanent
            }
        }
    );
    assert_eq!(transport.call_count(&a.page_url(0)), 1);
}

#[tokio::test]
async fn reopened_posting_is_updated_with_original_first_seen() {
    let a = StaticAdapter::new("a").with_candidates(vec![job("1", "Engineer")]);
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::new(registry(&[("a", &a)]), ok_transport(), store.clone(), fast_config()).unwrap();
    let cancel = CancellationToken::new();

    pipeline.run(&cancel).await;
    let first_seen = store.get_postings("a").await.unwrap()[0].first_seen_at;

    a.set_candidates(vec![]);
    pipeline.run(&cancel).await;

    a.set_candidates(vec![job("1", "Engineer")]);
    let summary = pipeline.run(&cancel).await;
    let report = summary.get("a").unwrap();

    assert_eq!((report.new_count, report.updated_count), (0, 1));
    let posting = &store.get_postings("a").await.unwrap()[0];
    assert_eq!(posting.status, PostingStatus::Active);
    assert_eq!(posting.first_seen_at, first_seen);
}

#[tokio::test]
async fn duplicate_candidates_warn_without_failing() {
    let a = StaticAdapter::new("a").with_candidates(vec![job("1", "First"), job("1", "Second")]);
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::new(registry(&[("a", &a)]), ok_transport(), store.clone(), fast_config()).unwrap();

    let summary = pipeline.run(&CancellationToken::new()).await;
    let report = summary.get("a").unwrap();

    assert_eq!(report.state, SourceState::Success);
    assert_eq!(report.new_count, 1);
    assert!(report
        .errors
        .iter()
        .any(|e| matches!(e, SourceIssue::DuplicateCandidate { external_id, discarded_index: 0 } if external_id == "1")));

    let stored = store.get_postings("a").await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].title, "Second");
}

#[tokio::test]
async fn skipped_and_invalid_items_give_partial_failure() {
    let mut relative = job("3", "Relative link");
    relative.url = "/jobs/3".to_string();
    let a = StaticAdapter::new("a").with_pages(vec![Ok(Extraction {
        candidates: vec![job("1", "Engineer"), relative],
        errors: vec![ExtractionError::per_item(1, "missing title")],
    })]);
    let pipeline = Pipeline::new(
        registry(&[("a", &a)]),
        ok_transport(),
        Arc::new(MemoryStore::new()),
        fast_config(),
    )
    .unwrap();

    let summary = pipeline.run(&CancellationToken::new()).await;
    let report = summary.get("a").unwrap();

    assert_eq!(report.state, SourceState::PartialFailure);
    assert_eq!(report.new_count, 1);
    assert!(report.errors.iter().any(|e| matches!(e, SourceIssue::Extraction { fatal: false, .. })));
    assert!(report.errors.iter().any(|e| matches!(e, SourceIssue::Validation { index: 1, .. })));
}

#[tokio::test]
async fn fatal_extraction_fails_without_closing_postings() {
    let a = StaticAdapter::new("a").with_candidates(vec![job("1", "Engineer")]);
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::new(registry(&[("a", &a)]), ok_transport(), store.clone(), fast_config()).unwrap();
    let cancel = CancellationToken::new();
    pipeline.run(&cancel).await;

    let broken = StaticAdapter::new("a").with_fatal("layout changed");
    let pipeline = Pipeline::new(registry(&[("a", &broken)]), ok_transport(), store.clone(), fast_config()).unwrap();
    let summary = pipeline.run(&cancel).await;

    assert_eq!(
        summary.get("a").unwrap().state,
        SourceState::Failed {
            kind: FailureKind::Extraction
        }
    );
    assert_eq!(store.get_active_postings("a").await.unwrap().len(), 1);
}

#[tokio::test]
async fn persistence_failure_discards_the_classification() {
    let a = StaticAdapter::new("a").with_candidates(vec![job("1", "Engineer")]);
    let store = Arc::new(FailingStore::new(MemoryStore::new()));
    store.fail_commits(true);
    let pipeline = Pipeline::new(registry(&[("a", &a)]), ok_transport(), store.clone(), fast_config()).unwrap();

    let summary = pipeline.run(&CancellationToken::new()).await;
    let report = summary.get("a").unwrap();

    assert_eq!(
        report.state,
        SourceState::Failed {
            kind: FailureKind::Persistence
        }
    );
    assert_eq!(report.new_count, 0);
    assert!(report.new_postings.is_empty());
    assert_eq!(store.commit_count(), 1);
    assert!(store.inner().is_empty());
}

#[tokio::test]
async fn unreadable_store_fails_the_source() {
    let a = StaticAdapter::new("a").with_candidates(vec![job("1", "Engineer")]);
    let store = Arc::new(FailingStore::new(MemoryStore::new()));
    store.fail_reads(true);
    let pipeline = Pipeline::new(registry(&[("a", &a)]), ok_transport(), store.clone(), fast_config()).unwrap();

    let summary = pipeline.run(&CancellationToken::new()).await;

    assert!(summary.get("a").unwrap().is_failed());
    assert_eq!(store.commit_count(), 0);
}

#[tokio::test]
async fn cancelled_before_start_fetches_nothing() {
    let a = StaticAdapter::new("a").with_candidates(vec![job("1", "Engineer")]);
    let transport = ok_transport();
    let pipeline = Pipeline::new(
        registry(&[("a", &a)]),
        transport.clone(),
        Arc::new(MemoryStore::new()),
        fast_config(),
    )
    .unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = pipeline.run(&cancel).await;

    assert_eq!(
        summary.get("a").unwrap().state,
        SourceState::Failed {
            kind: FailureKind::Cancelled
        }
    );
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn run_timeout_cancels_in_flight_sources_without_writes() {
    let a = StaticAdapter::new("a").with_candidates(vec![job("1", "Engineer")]);
    let transport = ok_transport().with_delay(Duration::from_millis(200));
    let store = Arc::new(MemoryStore::new());
    let config = fast_config().with_run_timeout(Duration::from_millis(30));
    let pipeline = Pipeline::new(registry(&[("a", &a)]), transport, store.clone(), config).unwrap();

    let summary = pipeline.run(&CancellationToken::new()).await;

    assert_eq!(
        summary.get("a").unwrap().state,
        SourceState::Failed {
            kind: FailureKind::Cancelled
        }
    );
    assert!(store.is_empty());
}

#[tokio::test]
async fn unknown_source_is_rejected_before_fetching() {
    let a = StaticAdapter::new("a");
    let transport = ok_transport();
    let pipeline = Pipeline::new(
        registry(&[("a", &a)]),
        transport.clone(),
        Arc::new(MemoryStore::new()),
        fast_config(),
    )
    .unwrap();

    let err = pipeline
        .run_sources(&["a".to_string(), "intel".to_string()], &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.source_id, "intel");
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn pages_are_walked_up_to_the_limit() {
    let a = StaticAdapter::new("a").with_pages(vec![
        Ok(Extraction {
            candidates: vec![job("1", "One")],
            errors: vec![],
        }),
        Ok(Extraction {
            candidates: vec![job("2", "Two")],
            errors: vec![],
        }),
        Ok(Extraction {
            candidates: vec![job("3", "Three")],
            errors: vec![],
        }),
    ]);

    let pipeline = Pipeline::new(
        registry(&[("a", &a)]),
        ok_transport(),
        Arc::new(MemoryStore::new()),
        fast_config(),
    )
    .unwrap();
    let summary = pipeline.run(&CancellationToken::new()).await;
    assert_eq!(summary.get("a").unwrap().pages_fetched, 3);
    assert_eq!(summary.get("a").unwrap().new_count, 3);

    let capped = Pipeline::new(
        registry(&[("a", &a)]),
        ok_transport(),
        Arc::new(MemoryStore::new()),
        fast_config().with_max_pages(2),
    )
    .unwrap();
    let summary = capped.run(&CancellationToken::new()).await;
    assert_eq!(summary.get("a").unwrap().pages_fetched, 2);
    assert_eq!(summary.get("a").unwrap().new_count, 2);
    assert_eq!(summary.get("a").unwrap().state, SourceState::PartialFailure);
}

#[tokio::test]
async fn capped_walk_does_not_close_unfetched_postings() {
    let a = StaticAdapter::new("a").with_pages(vec![
        Ok(Extraction {
            candidates: vec![job("1", "One")],
            errors: vec![],
        }),
        Ok(Extraction {
            candidates: vec![job("2", "Two")],
            errors: vec![],
        }),
        Ok(Extraction {
            candidates: vec![job("3", "Three")],
            errors: vec![],
        }),
    ]);
    let store = Arc::new(MemoryStore::new());
    let cancel = CancellationToken::new();

    let full = Pipeline::new(registry(&[("a", &a)]), ok_transport(), store.clone(), fast_config()).unwrap();
    assert_eq!(full.run(&cancel).await.get("a").unwrap().new_count, 3);

    let capped = Pipeline::new(
        registry(&[("a", &a)]),
        ok_transport(),
        store.clone(),
        fast_config().with_max_pages(2),
    )
    .unwrap();
    let summary = capped.run(&cancel).await;
    let report = summary.get("a").unwrap();

    assert_eq!(report.state, SourceState::PartialFailure);
    assert_eq!((report.unchanged_count, report.closed_count), (2, 0));
    assert!(report
        .errors
        .iter()
        .any(|e| matches!(e, SourceIssue::Truncated { pages: 2, .. })));

    let mut active: Vec<String> = store
        .get_active_postings("a")
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.external_id)
        .collect();
    active.sort();
    assert_eq!(active, vec!["1", "2", "3"]);
}

#[tokio::test]
async fn capped_walk_still_records_new_postings() {
    let a = StaticAdapter::new("a").with_pages(vec![
        Ok(Extraction {
            candidates: vec![job("1", "One")],
            errors: vec![],
        }),
        Ok(Extraction {
            candidates: vec![job("2", "Two")],
            errors: vec![],
        }),
    ]);
    let store = Arc::new(MemoryStore::new());
    let capped = Pipeline::new(
        registry(&[("a", &a)]),
        ok_transport(),
        store.clone(),
        fast_config().with_max_pages(1),
    )
    .unwrap();

    let summary = capped.run(&CancellationToken::new()).await;

    assert_eq!(summary.get("a").unwrap().new_count, 1);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn overlapping_runs_serialize_per_source() {
    let a = StaticAdapter::new("a").with_candidates(vec![job("1", "Engineer")]);
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::new(registry(&[("a", &a)]), ok_transport(), store.clone(), fast_config()).unwrap();
    let cancel = CancellationToken::new();

    let (first, second) = tokio::join!(pipeline.run(&cancel), pipeline.run(&cancel));

    let new_total = first.get("a").unwrap().new_count + second.get("a").unwrap().new_count;
    let unchanged_total = first.get("a").unwrap().unchanged_count + second.get("a").unwrap().unchanged_count;
    assert_eq!((new_total, unchanged_total), (1, 1));
}

#[tokio::test]
async fn micron_adapter_end_to_end_with_headers_and_paging() {
    let adapter = MicronAdapter::new().with_page_size(1);
    let first_url = adapter.first_request().url;
    let second_url = first_url.replace("start=0", "start=1");

    let page = |id: u32, title: &str| {
        serde_json::json!({
            "count": 2,
            "positions": [{
                "id": id,
                "name": title,
                "location": "Boise, ID",
                "canonicalPositionUrl": format!("https://careers.micron.com/careers/job/{}", id)
            }]
        })
        .to_string()
    };
    let transport = MockTransport::new()
        .with_fallback(&first_url, RawContent::ok(&first_url, page(1, "Process Engineer")))
        .with_fallback(&second_url, RawContent::ok(&second_url, page(2, "Yield Engineer")));

    let mut registry = AdapterRegistry::new();
    registry.register("micron", Arc::new(adapter)).unwrap();
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::new(Arc::new(registry), transport.clone(), store.clone(), fast_config()).unwrap();

    let summary = pipeline.run(&CancellationToken::new()).await;
    let report = summary.get("micron").unwrap();

    assert_eq!(report.state, SourceState::Success);
    assert_eq!(report.pages_fetched, 2);
    assert_eq!(report.new_count, 2);

    let calls = transport.calls();
    assert_eq!(
        calls[0].headers.get("Referer").map(String::as_str),
        Some("https://careers.micron.com/careers")
    );
}

#[tokio::test]
async fn connection_errors_recover_within_retries() {
    let a = StaticAdapter::new("a").with_candidates(vec![job("1", "Engineer")]);
    let transport = ok_transport().with_error(a.page_url(0), TransportError::Connection("reset".to_string()));
    let pipeline = Pipeline::new(
        registry(&[("a", &a)]),
        transport.clone(),
        Arc::new(MemoryStore::new()),
        fast_config(),
    )
    .unwrap();

    let summary = pipeline.run(&CancellationToken::new()).await;

    assert_eq!(summary.get("a").unwrap().state, SourceState::Success);
    assert_eq!(transport.call_count(&a.page_url(0)), 2);
}

#[tokio::test]
async fn sqlite_store_scenario() {
    let a = StaticAdapter::new("a").with_candidates(vec![job("1", "Engineer")]);
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let pipeline = Pipeline::new(registry(&[("a", &a)]), ok_transport(), store.clone(), fast_config()).unwrap();
    let cancel = CancellationToken::new();

    assert_eq!(pipeline.run(&cancel).await.get("a").unwrap().new_count, 1);
    assert_eq!(pipeline.run(&cancel).await.get("a").unwrap().unchanged_count, 1);

    a.set_candidates(vec![]);
    assert_eq!(pipeline.run(&cancel).await.get("a").unwrap().closed_count, 1);
    assert!(store.get_active_postings("a").await.unwrap().is_empty());
}
