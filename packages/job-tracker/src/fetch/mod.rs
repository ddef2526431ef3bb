//! Fetch layer - retrieves raw content for a source.
//!
//! The [`Fetcher`] wraps any [`Transport`] with:
//! - failure classification (transient vs permanent)
//! - retries with configurable backoff for transient failures only
//! - a per-source rate limit using the governor crate
//! - cooperative cancellation between attempts and during sends
//!
//! It never touches shared state beyond its own rate limiters.

mod http;

pub use http::HttpTransport;

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};

use governor::{Quota, RateLimiter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{FetchError, FetchErrorKind, FetchResult, TransportError};
use crate::traits::transport::{FetchRequest, RawContent, Transport};
use crate::types::config::FetchOptions;

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Retrying, rate-limited fetcher over a transport.
pub struct Fetcher<T: Transport> {
    transport: T,
    limiters: Mutex<HashMap<String, Arc<DefaultRateLimiter>>>,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            limiters: Mutex::new(HashMap::new()),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetch one request for `source_id`.
    ///
    /// - 2xx: returned as-is
    /// - timeout, connection failure, 5xx, 429: retried up to
    ///   `options.retries` times, then `Exhausted`
    /// - other 4xx, malformed request/response: `Permanent` immediately
    /// - cancellation between attempts: `Cancelled`
    pub async fn fetch(
        &self,
        source_id: &str,
        request: &FetchRequest,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> FetchResult<RawContent> {
        let headers = request.merged_headers(&options.headers);
        let limiter = self.limiter_for(source_id, options);
        let max_attempts = options.retries.saturating_add(1);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            if cancel.is_cancelled() {
                return Err(FetchError::cancelled(&request.url));
            }

            if let Some(limiter) = &limiter {
                tokio::select! {
                    _ = limiter.until_ready() => {}
                    _ = cancel.cancelled() => return Err(FetchError::cancelled(&request.url)),
                }
            }

            debug!(source_id, url = %request.url, attempt, "Fetching");

            let send = tokio::time::timeout(
                options.timeout,
                self.transport.send(request, &headers, options.timeout),
            );
            let sent = tokio::select! {
                sent = send => sent.unwrap_or(Err(TransportError::Timeout)),
                _ = cancel.cancelled() => return Err(FetchError::cancelled(&request.url)),
            };

            let err = match sent {
                Ok(raw) => match classify_status(&raw) {
                    None => return Ok(raw),
                    Some(err) => err,
                },
                Err(e) => classify_transport_error(&request.url, e),
            };

            if !err.is_retryable() {
                warn!(source_id, url = %request.url, error = %err, "Fetch failed permanently");
                return Err(err);
            }

            if attempt >= max_attempts {
                warn!(source_id, url = %request.url, attempts = attempt, "Fetch retries exhausted");
                return Err(FetchError::new(
                    FetchErrorKind::Exhausted,
                    &request.url,
                    format!("gave up after {} attempts: {}", attempt, err.message),
                ));
            }

            let delay = options.backoff.delay_for(attempt);
            warn!(
                source_id,
                url = %request.url,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err.message,
                "Transient fetch failure, retrying"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(FetchError::cancelled(&request.url)),
            }
        }
    }

    /// Lazily create the rate limiter for a source.
    fn limiter_for(&self, source_id: &str, options: &FetchOptions) -> Option<Arc<DefaultRateLimiter>> {
        let rps = NonZeroU32::new(options.requests_per_second?)?;
        let mut limiters = self.limiters.lock().unwrap_or_else(|e| e.into_inner());
        let limiter = limiters
            .entry(source_id.to_string())
            .or_insert_with(|| Arc::new(RateLimiter::direct(Quota::per_second(rps))));
        Some(Arc::clone(limiter))
    }
}

/// Map a non-2xx status to a fetch error. `None` means success.
fn classify_status(raw: &RawContent) -> Option<FetchError> {
    match raw.status {
        200..=299 => None,
        429 | 500..=599 => Some(FetchError::transient(
            &raw.url,
            format!("HTTP {}", raw.status),
        )),
        status => Some(FetchError::permanent(&raw.url, format!("HTTP {}", status))),
    }
}

fn classify_transport_error(url: &str, err: TransportError) -> FetchError {
    match err {
        TransportError::Timeout | TransportError::Connection(_) => {
            FetchError::transient(url, err.to_string())
        }
        TransportError::Malformed(_) => FetchError::permanent(url, err.to_string()),
    }
}
