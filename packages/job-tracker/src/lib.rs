//! Job Posting Tracker
//!
//! Periodically collects job postings from company career pages, keeps a
//! canonical record of each posting, and reports which postings are new and
//! which have disappeared since the previous run.
//!
//! # Flow
//!
//! Each registered source runs through its own state machine:
//!
//! 1. **Fetch** - retrieve every page of the source through a [`Transport`],
//!    with retries, backoff and a per-source rate limit
//! 2. **Extract** - a per-company [`SourceAdapter`] turns raw pages into
//!    candidates, skipping malformed listings
//! 3. **Reconcile** - compare candidates with stored postings and classify
//!    New / Updated / Unchanged / Closed
//! 4. **Persist** - one atomic [`PostingStore::commit`] per source
//!
//! A source that cannot be fetched or parsed is reported `Failed` and its
//! stored postings stay exactly as they were.
//!
//! # Usage
//!
//! ```rust,ignore
//! use job_tracker::{default_registry, Config, HttpTransport, Pipeline, SqliteStore};
//!
//! let config = Config::from_env()?;
//! let registry = Arc::new(default_registry(&config)?);
//! let store = Arc::new(SqliteStore::new(&config.database_url).await?);
//! let pipeline = Pipeline::new(registry, HttpTransport::new()?, store, config.pipeline_config())?;
//!
//! let summary = pipeline.run(&CancellationToken::new()).await;
//! for posting in summary.new_postings() {
//!     println!("{} - {}", posting.title, posting.url);
//! }
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Seams of the pipeline (Transport, SourceAdapter, PostingStore)
//! - [`types`] - Postings, configuration and run summaries
//! - [`fetch`] - Retrying, rate-limited fetcher and the reqwest transport
//! - [`adapters`] - Built-in sources (Micron, ASML) and a generic HTML adapter
//! - [`reconcile`] - Change detection
//! - [`pipeline`] - Orchestration across sources
//! - [`stores`] - Storage implementations (MemoryStore, SqliteStore)
//! - [`testing`] - Mock implementations for testing

pub mod adapters;
pub mod config;
pub mod error;
pub mod fetch;
pub mod pipeline;
pub mod reconcile;
pub mod registry;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use adapters::{default_registry, AsmlAdapter, HtmlListingAdapter, HtmlSelectors, MicronAdapter};
pub use config::Config;
pub use error::{
    ConfigurationError, ExtractionError, FetchError, FetchErrorKind, NotFoundError,
    PersistenceError, TransportError, ValidationError,
};
pub use fetch::{Fetcher, HttpTransport};
pub use pipeline::Pipeline;
pub use reconcile::{reconcile, DuplicateCandidateWarning, Reconciliation};
pub use registry::AdapterRegistry;
pub use traits::{
    adapter::{Extraction, SourceAdapter},
    store::{ChangeSet, PostingQuery, PostingStore},
    transport::{FetchRequest, HttpMethod, RawContent, Transport},
};
pub use types::{
    config::{Backoff, FetchOptions, PipelineConfig},
    posting::{JobPosting, JobPostingCandidate, NormalizedPosting, PostingIdentity, PostingStatus},
    summary::{FailureKind, RunSummary, SourceIssue, SourceReport, SourceState},
};

// Re-export stores
pub use stores::MemoryStore;

#[cfg(feature = "sqlite")]
pub use stores::SqliteStore;
