//! Testing utilities including mock implementations.
//!
//! These are useful for exercising the pipeline without network access or
//! a real database.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ExtractResult, ExtractionError, PersistenceError, StoreResult, TransportError};
use crate::stores::MemoryStore;
use crate::traits::adapter::{Extraction, SourceAdapter};
use crate::traits::store::{ChangeSet, PostingQuery, PostingStore};
use crate::traits::transport::{FetchRequest, HttpMethod, RawContent, Transport};
use crate::types::posting::{JobPosting, JobPostingCandidate};

type Scripted = Result<RawContent, TransportError>;

/// A mock transport with scripted responses per URL.
///
/// Lookup order for a request: the URL's queued responses (FIFO), then the
/// URL's fallback, then the global default, then a 404. Clones share state,
/// so a test can keep a handle after moving the transport into a pipeline.
#[derive(Clone, Default)]
pub struct MockTransport {
    queued: Arc<RwLock<HashMap<String, VecDeque<Scripted>>>>,
    fallbacks: Arc<RwLock<HashMap<String, Scripted>>>,
    default_response: Arc<RwLock<Option<RawContent>>>,
    delay: Option<Duration>,
    calls: Arc<RwLock<Vec<MockTransportCall>>>,
}

/// Record of a request sent through the mock.
#[derive(Debug, Clone)]
pub struct MockTransportCall {
    pub url: String,
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for one request to `url`.
    pub fn with_response(self, url: impl Into<String>, response: RawContent) -> Self {
        self.push(url.into(), Ok(response));
        self
    }

    /// Queue a transport error for one request to `url`.
    pub fn with_error(self, url: impl Into<String>, error: TransportError) -> Self {
        self.push(url.into(), Err(error));
        self
    }

    /// Response returned for `url` whenever its queue is empty.
    pub fn with_fallback(self, url: impl Into<String>, response: RawContent) -> Self {
        self.set_fallback(url, response);
        self
    }

    /// Response for any URL with nothing scripted.
    pub fn with_default_response(self, response: RawContent) -> Self {
        *self.default_response.write().unwrap() = Some(response);
        self
    }

    /// Delay every response (for timeout and cancellation tests).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replace the fallback for `url` after construction.
    pub fn set_fallback(&self, url: impl Into<String>, response: RawContent) {
        self.fallbacks.write().unwrap().insert(url.into(), Ok(response));
    }

    /// Make every request to `url` fail with `error` until replaced.
    pub fn set_fallback_error(&self, url: impl Into<String>, error: TransportError) {
        self.fallbacks.write().unwrap().insert(url.into(), Err(error));
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockTransportCall> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.read().unwrap().iter().filter(|c| c.url == url).count()
    }

    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }

    fn push(&self, url: String, scripted: Scripted) {
        self.queued
            .write()
            .unwrap()
            .entry(url)
            .or_default()
            .push_back(scripted);
    }

    fn next_for(&self, url: &str) -> Scripted {
        if let Some(scripted) = self.queued.write().unwrap().get_mut(url).and_then(VecDeque::pop_front) {
            return scripted;
        }
        if let Some(scripted) = self.fallbacks.read().unwrap().get(url) {
            return scripted.clone();
        }
        match self.default_response.read().unwrap().as_ref() {
            Some(response) => {
                let mut response = response.clone();
                response.url = url.to_string();
                Ok(response)
            }
            None => Ok(RawContent::new(url, 404, "not found")),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        request: &FetchRequest,
        headers: &BTreeMap<String, String>,
        _timeout: Duration,
    ) -> Result<RawContent, TransportError> {
        self.calls.write().unwrap().push(MockTransportCall {
            url: request.url.clone(),
            method: request.method,
            headers: headers.clone(),
            body: request.body.clone(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.next_for(&request.url)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// An adapter that ignores page content and returns canned candidates.
///
/// Multi-page sources are simulated with `?page=N` URLs. Clones share
/// state so candidates can be swapped between runs.
#[derive(Clone)]
pub struct StaticAdapter {
    name: String,
    base_url: String,
    pages: Arc<RwLock<Vec<ExtractResult<Extraction>>>>,
}

impl StaticAdapter {
    /// Single empty page at `https://jobs.example.com/{name}`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            base_url: format!("https://jobs.example.com/{}", name),
            name,
            pages: Arc::new(RwLock::new(vec![Ok(Extraction::new())])),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Single page with these candidates.
    pub fn with_candidates(self, candidates: Vec<JobPostingCandidate>) -> Self {
        self.set_candidates(candidates);
        self
    }

    /// One extraction per page, in order.
    pub fn with_pages(self, pages: Vec<ExtractResult<Extraction>>) -> Self {
        *self.pages.write().unwrap() = pages;
        self
    }

    /// Every page fails as unrecognized.
    pub fn with_fatal(self, reason: impl Into<String>) -> Self {
        *self.pages.write().unwrap() = vec![Err(ExtractionError::fatal(reason))];
        self
    }

    /// Replace the single page's candidates.
    pub fn set_candidates(&self, candidates: Vec<JobPostingCandidate>) {
        *self.pages.write().unwrap() = vec![Ok(Extraction {
            candidates,
            errors: Vec::new(),
        })];
    }

    /// URL of page `index` (0-based).
    pub fn page_url(&self, index: usize) -> String {
        if index == 0 {
            self.base_url.clone()
        } else {
            format!("{}?page={}", self.base_url, index)
        }
    }

    fn page_index(&self, url: &str) -> usize {
        url.rsplit_once("?page=")
            .and_then(|(_, n)| n.parse().ok())
            .unwrap_or(0)
    }
}

impl SourceAdapter for StaticAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn first_request(&self) -> FetchRequest {
        FetchRequest::get(self.page_url(0))
    }

    fn next_request(&self, previous: &FetchRequest, _raw: &RawContent) -> Option<FetchRequest> {
        let next = self.page_index(&previous.url) + 1;
        (next < self.pages.read().unwrap().len()).then(|| FetchRequest::get(self.page_url(next)))
    }

    fn extract(&self, raw: &RawContent) -> ExtractResult<Extraction> {
        let index = self.page_index(&raw.url);
        self.pages
            .read()
            .unwrap()
            .get(index)
            .cloned()
            .unwrap_or_else(|| Err(ExtractionError::fatal(format!("no page {}", index))))
    }
}

/// A store wrapper whose reads and commits can be made to fail.
#[derive(Default)]
pub struct FailingStore {
    inner: MemoryStore,
    fail_reads: AtomicBool,
    fail_commits: AtomicBool,
    commits: AtomicUsize,
}

impl FailingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Commits attempted, including failed ones.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn check(&self, flag: &AtomicBool) -> StoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(PersistenceError::Unavailable("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PostingStore for FailingStore {
    async fn get_postings(&self, source_id: &str) -> StoreResult<Vec<JobPosting>> {
        self.check(&self.fail_reads)?;
        self.inner.get_postings(source_id).await
    }

    async fn commit(&self, source_id: &str, changes: &ChangeSet) -> StoreResult<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.check(&self.fail_commits)?;
        self.inner.commit(source_id, changes).await
    }

    async fn query(&self, query: &PostingQuery) -> StoreResult<Vec<JobPosting>> {
        self.check(&self.fail_reads)?;
        self.inner.query(query).await
    }
}
