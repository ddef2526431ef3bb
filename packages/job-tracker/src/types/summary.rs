//! Run summary types - per-source outcomes handed to the caller.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ExtractionError, FetchError, FetchErrorKind, PersistenceError, ValidationError};
use crate::types::posting::JobPosting;

/// Why a source ended `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum FailureKind {
    Fetch { kind: FetchErrorKind },
    Extraction,
    Persistence,
    Cancelled,
}

/// Per-source state machine.
///
/// `Pending → Fetching → Extracting → Reconciling → Persisting → Success`,
/// with `PartialFailure` and `Failed` as the other terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SourceState {
    Pending,
    Fetching,
    Extracting,
    Reconciling,
    Persisting,
    Success,
    PartialFailure,
    Failed { kind: FailureKind },
}

impl SourceState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SourceState::Success | SourceState::PartialFailure | SourceState::Failed { .. }
        )
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: &SourceState) -> bool {
        use SourceState::*;
        match (self, next) {
            (_, Failed { .. }) => !self.is_terminal(),
            (Pending, Fetching) => true,
            (Fetching, Extracting) => true,
            (Extracting, Reconciling) => true,
            (Reconciling, Persisting) => true,
            (Persisting, Success) | (Persisting, PartialFailure) => true,
            _ => false,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SourceState::Pending => "pending",
            SourceState::Fetching => "fetching",
            SourceState::Extracting => "extracting",
            SourceState::Reconciling => "reconciling",
            SourceState::Persisting => "persisting",
            SourceState::Success => "success",
            SourceState::PartialFailure => "partial_failure",
            SourceState::Failed { .. } => "failed",
        }
    }
}

/// One problem recorded while processing a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceIssue {
    Fetch {
        kind: FetchErrorKind,
        url: String,
        message: String,
    },
    Extraction {
        page: usize,
        fatal: bool,
        message: String,
    },
    Validation {
        page: usize,
        index: usize,
        message: String,
    },
    DuplicateCandidate {
        external_id: String,
        discarded_index: usize,
    },
    Persistence {
        message: String,
    },
    /// The page walk stopped early, so closures were not applied.
    Truncated {
        pages: usize,
        message: String,
    },
    Cancelled,
}

impl SourceIssue {
    pub fn fetch(err: &FetchError) -> Self {
        SourceIssue::Fetch {
            kind: err.kind,
            url: err.url.clone(),
            message: err.message.clone(),
        }
    }

    pub fn extraction(page: usize, err: &ExtractionError) -> Self {
        SourceIssue::Extraction {
            page,
            fatal: err.is_fatal(),
            message: err.to_string(),
        }
    }

    pub fn validation(page: usize, index: usize, err: &ValidationError) -> Self {
        SourceIssue::Validation {
            page,
            index,
            message: err.to_string(),
        }
    }

    pub fn persistence(err: &PersistenceError) -> Self {
        SourceIssue::Persistence {
            message: err.to_string(),
        }
    }

    /// Warnings do not demote a source to `PartialFailure`.
    pub fn is_warning(&self) -> bool {
        matches!(self, SourceIssue::DuplicateCandidate { .. })
    }
}

/// Outcome of one source within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReport {
    pub source_id: String,
    pub state: SourceState,
    pub pages_fetched: usize,
    pub new_count: usize,
    pub updated_count: usize,
    pub unchanged_count: usize,
    pub closed_count: usize,
    #[serde(default)]
    pub errors: Vec<SourceIssue>,
    /// Postings seen for the first time in this run
    #[serde(default)]
    pub new_postings: Vec<JobPosting>,
}

impl SourceReport {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            state: SourceState::Pending,
            pages_fetched: 0,
            new_count: 0,
            updated_count: 0,
            unchanged_count: 0,
            closed_count: 0,
            errors: Vec::new(),
            new_postings: Vec::new(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, SourceState::Failed { .. })
    }

    /// True when any non-warning issue was recorded.
    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(|e| !e.is_warning())
    }
}

/// Structured report for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// In registration order
    pub sources: IndexMap<String, SourceReport>,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            started_at,
            finished_at: None,
            sources: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, report: SourceReport) {
        self.sources.insert(report.source_id.clone(), report);
    }

    pub fn get(&self, source_id: &str) -> Option<&SourceReport> {
        self.sources.get(source_id)
    }

    pub fn total_new(&self) -> usize {
        self.sources.values().map(|r| r.new_count).sum()
    }

    pub fn total_closed(&self) -> usize {
        self.sources.values().map(|r| r.closed_count).sum()
    }

    pub fn failed_sources(&self) -> Vec<&str> {
        self.sources
            .values()
            .filter(|r| r.is_failed())
            .map(|r| r.source_id.as_str())
            .collect()
    }

    /// All postings first seen during this run, across sources.
    pub fn new_postings(&self) -> impl Iterator<Item = &JobPosting> {
        self.sources.values().flat_map(|r| r.new_postings.iter())
    }
}
