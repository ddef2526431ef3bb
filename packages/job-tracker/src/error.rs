//! Typed errors for the job tracker.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so each failure keeps
//! its classification all the way up to the run summary.

use std::fmt;

use thiserror::Error;

/// Classification of a fetch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// Timeout, connection reset, 5xx. Retried by the fetch layer.
    Transient,
    /// 4xx or malformed response. Never retried.
    Permanent,
    /// Every attempt failed with a transient error.
    Exhausted,
    /// The run was cancelled while fetching.
    Cancelled,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FetchErrorKind::Transient => "transient",
            FetchErrorKind::Permanent => "permanent",
            FetchErrorKind::Exhausted => "exhausted",
            FetchErrorKind::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// A classified failure to retrieve raw content for a source.
#[derive(Debug, Clone, Error)]
#[error("{kind} fetch failure for {url}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub url: String,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn transient(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Transient, url, message)
    }

    pub fn permanent(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Permanent, url, message)
    }

    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Cancelled, url, "run cancelled")
    }

    /// Only transient failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        self.kind == FetchErrorKind::Transient
    }
}

/// Errors raised by the transport boundary before any HTTP status is known.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The request did not complete within the configured timeout
    #[error("request timed out")]
    Timeout,

    /// Connection refused, reset or otherwise dropped
    #[error("connection error: {0}")]
    Connection(String),

    /// The request could not be built or the body could not be read
    #[error("malformed request or response: {0}")]
    Malformed(String),
}

/// Errors produced by a source adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    /// One listing could not be read; the rest of the page is still usable.
    #[error("item {index} skipped: {reason}")]
    PerItem { index: usize, reason: String },

    /// The page format was not recognized at all.
    #[error("unrecognized page structure: {reason}")]
    Fatal { reason: String },
}

impl ExtractionError {
    pub fn per_item(index: usize, reason: impl Into<String>) -> Self {
        ExtractionError::PerItem {
            index,
            reason: reason.into(),
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        ExtractionError::Fatal {
            reason: reason.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ExtractionError::Fatal { .. })
    }
}

/// A candidate could not be turned into a canonical posting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("source_id is missing")]
    MissingSourceId,

    #[error("title is empty after normalization")]
    EmptyTitle,

    #[error("url is empty after normalization")]
    EmptyUrl,

    #[error("url is not absolute: {0}")]
    InvalidUrl(String),
}

/// Registry or configuration misuse. Fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("source already registered: {0}")]
    DuplicateSource(String),

    #[error("source_id must not be empty")]
    EmptySourceId,

    #[error("invalid option {name}: {reason}")]
    InvalidOption { name: String, reason: String },
}

/// Lookup of a source that was never registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no adapter registered for source: {source_id}")]
pub struct NotFoundError {
    pub source_id: String,
}

/// Storage-layer failures. Surfaced to the caller, never retried here.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The store cannot be reached at all
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A storage operation failed
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A stored row could not be decoded
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl PersistenceError {
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        PersistenceError::Storage(Box::new(err))
    }
}

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for adapter extraction.
pub type ExtractResult<T> = std::result::Result<T, ExtractionError>;

/// Result type alias for storage operations.
pub type StoreResult<T> = std::result::Result<T, PersistenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(FetchError::transient("https://a", "503").is_retryable());
        assert!(!FetchError::permanent("https://a", "404").is_retryable());
        assert!(!FetchError::cancelled("https://a").is_retryable());
        assert!(!FetchError::new(FetchErrorKind::Exhausted, "https://a", "gave up").is_retryable());
    }

    #[test]
    fn test_fetch_error_display_includes_kind_and_url() {
        let err = FetchError::permanent("https://careers.example.com", "HTTP 404");
        assert_eq!(
            err.to_string(),
            "permanent fetch failure for https://careers.example.com: HTTP 404"
        );
    }

    #[test]
    fn test_extraction_error_fatal_flag() {
        assert!(ExtractionError::fatal("no json").is_fatal());
        assert!(!ExtractionError::per_item(3, "missing title").is_fatal());
    }
}
