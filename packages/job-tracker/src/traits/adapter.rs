//! Source adapter trait - one implementation per company career page.
//!
//! Adapters are pure: they describe which requests to make and how to read
//! the responses, but never perform I/O themselves. The pipeline fetches the
//! pages and hands each one to [`SourceAdapter::extract`].

use serde::{Deserialize, Serialize};

use crate::error::{ExtractResult, ExtractionError};
use crate::traits::transport::{FetchRequest, RawContent};
use crate::types::config::FetchOptions;
use crate::types::posting::JobPostingCandidate;

/// Output of extracting one page.
///
/// A malformed listing does not abort the page: it is skipped and recorded
/// in `errors` as [`ExtractionError::PerItem`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    /// Candidates in page order
    pub candidates: Vec<JobPostingCandidate>,

    #[serde(skip)]
    pub errors: Vec<ExtractionError>,
}

impl Extraction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, candidate: JobPostingCandidate) {
        self.candidates.push(candidate);
    }

    pub fn skip(&mut self, index: usize, reason: impl Into<String>) {
        self.errors.push(ExtractionError::per_item(index, reason));
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Capability every per-company adapter implements.
pub trait SourceAdapter: Send + Sync {
    /// Human-readable company name (for logging/debugging).
    fn name(&self) -> &str;

    /// Request for the first page of listings.
    fn first_request(&self) -> FetchRequest;

    /// Request for the page after `previous`, or `None` when done.
    ///
    /// Defaults to single-page sources.
    fn next_request(&self, _previous: &FetchRequest, _raw: &RawContent) -> Option<FetchRequest> {
        None
    }

    /// Turn one fetched page into candidates.
    ///
    /// Must be deterministic for identical input. Returns
    /// [`ExtractionError::Fatal`] only when the page format is unrecognized.
    fn extract(&self, raw: &RawContent) -> ExtractResult<Extraction>;

    /// Fetch preferences for this source (headers, rate limit). `None` uses
    /// the pipeline defaults.
    fn fetch_options(&self) -> Option<FetchOptions> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_collects_candidates_and_skips() {
        let mut extraction = Extraction::new();
        assert!(extraction.is_empty());

        extraction.push(JobPostingCandidate::new("Engineer", "https://example.com/1"));
        extraction.skip(1, "missing title");

        assert_eq!(extraction.candidates.len(), 1);
        assert_eq!(
            extraction.errors,
            vec![ExtractionError::per_item(1, "missing title")]
        );
    }
}
