//! Posting types - raw candidates, canonical postings and their identity.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ValidationError;

/// Collapse runs of whitespace to a single space and trim. Case is preserved.
pub fn normalize_text(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize an optional field; blank values become `None`.
pub fn normalize_optional(value: Option<&str>) -> Option<String> {
    value.map(normalize_text).filter(|v| !v.is_empty())
}

/// Identity of a posting: `(source_id, external_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PostingIdentity {
    pub source_id: String,
    pub external_id: String,
}

impl PostingIdentity {
    pub fn new(source_id: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            external_id: external_id.into(),
        }
    }
}

impl fmt::Display for PostingIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source_id, self.external_id)
    }
}

/// Lifecycle status of a stored posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostingStatus {
    Active,
    Closed,
}

impl PostingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostingStatus::Active => "active",
            PostingStatus::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(PostingStatus::Active),
            "closed" => Some(PostingStatus::Closed),
            _ => None,
        }
    }
}

/// Raw field values as an adapter found them, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPostingCandidate {
    /// Identifier assigned by the source, if it has one
    pub external_id: Option<String>,

    pub title: String,

    pub location: Option<String>,

    /// Absolute URL of the posting
    pub url: String,

    pub posted_at: Option<DateTime<Utc>>,

    pub department: Option<String>,

    pub description: Option<String>,

    /// Source-specific fields that still count towards the fingerprint
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl JobPostingCandidate {
    /// Create a candidate with the two mandatory fields.
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_posted_at(mut self, posted_at: DateTime<Utc>) -> Self {
        self.posted_at = Some(posted_at);
        self
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// A candidate after normalization and validation, not yet reconciled.
///
/// Timestamps are absent here; they are owned by the change detector.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPosting {
    pub identity: PostingIdentity,
    pub title: String,
    pub location: Option<String>,
    pub url: String,
    pub posted_at: Option<DateTime<Utc>>,
    pub department: Option<String>,
    pub description: Option<String>,
    pub raw_fingerprint: String,
}

impl NormalizedPosting {
    /// Normalize and validate a candidate for `source_id`.
    ///
    /// `source_id` is kept verbatim. Fails if it is blank, if `title` or
    /// `url` is empty after normalization, or if `url` is not absolute.
    pub fn from_candidate(
        source_id: &str,
        candidate: &JobPostingCandidate,
    ) -> Result<Self, ValidationError> {
        if source_id.trim().is_empty() {
            return Err(ValidationError::MissingSourceId);
        }

        let title = normalize_text(&candidate.title);
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }

        let url = normalize_text(&candidate.url);
        if url.is_empty() {
            return Err(ValidationError::EmptyUrl);
        }
        match url::Url::parse(&url) {
            Ok(parsed) if parsed.has_host() => {}
            _ => return Err(ValidationError::InvalidUrl(url)),
        }

        let location = normalize_optional(candidate.location.as_deref());
        let department = normalize_optional(candidate.department.as_deref());
        let description = normalize_optional(candidate.description.as_deref());
        let extra: BTreeMap<String, String> = candidate
            .extra
            .iter()
            .map(|(k, v)| (normalize_text(k), normalize_text(v)))
            .collect();

        let external_id = match normalize_optional(candidate.external_id.as_deref()) {
            Some(id) => id,
            None => derive_external_id(&title, location.as_deref(), &url),
        };

        let posted_at = candidate.posted_at.map(|t| t.to_rfc3339());
        let raw_fingerprint = fingerprint(
            &[
                ("title", Some(title.as_str())),
                ("location", location.as_deref()),
                ("url", Some(url.as_str())),
                ("posted_at", posted_at.as_deref()),
                ("department", department.as_deref()),
                ("description", description.as_deref()),
            ],
            &extra,
        );

        Ok(Self {
            identity: PostingIdentity::new(source_id, external_id),
            title,
            location,
            url,
            posted_at: candidate.posted_at,
            department,
            description,
            raw_fingerprint,
        })
    }
}

/// Canonical, persisted job posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub source_id: String,
    pub external_id: String,
    pub title: String,
    pub location: Option<String>,
    pub url: String,
    /// Falls back to the first-observed time when the source gives none
    pub posted_at: DateTime<Utc>,
    pub department: Option<String>,
    pub description: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub status: PostingStatus,
    pub raw_fingerprint: String,
}

impl JobPosting {
    /// First observation of an identity.
    pub fn first_observed(normalized: NormalizedPosting, now: DateTime<Utc>) -> Self {
        Self {
            source_id: normalized.identity.source_id,
            external_id: normalized.identity.external_id,
            title: normalized.title,
            location: normalized.location,
            url: normalized.url,
            posted_at: normalized.posted_at.unwrap_or(now),
            department: normalized.department,
            description: normalized.description,
            first_seen_at: now,
            last_seen_at: now,
            status: PostingStatus::Active,
            raw_fingerprint: normalized.raw_fingerprint,
        }
    }

    /// Overwrite the mutable fields with a fresh observation.
    ///
    /// `first_seen_at` is kept. A missing `posted_at` keeps the stored value.
    pub fn apply_observation(&mut self, normalized: NormalizedPosting, now: DateTime<Utc>) {
        self.title = normalized.title;
        self.location = normalized.location;
        self.url = normalized.url;
        if let Some(posted_at) = normalized.posted_at {
            self.posted_at = posted_at;
        }
        self.department = normalized.department;
        self.description = normalized.description;
        self.raw_fingerprint = normalized.raw_fingerprint;
        self.status = PostingStatus::Active;
        self.last_seen_at = now;
    }

    pub fn identity(&self) -> PostingIdentity {
        PostingIdentity::new(self.source_id.clone(), self.external_id.clone())
    }

    pub fn is_active(&self) -> bool {
        self.status == PostingStatus::Active
    }
}

/// SHA-256 over labelled field values. Missing values hash differently from
/// empty strings, and the unit separator keeps adjacent fields from merging.
fn fingerprint(fields: &[(&str, Option<&str>)], extra: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    for (name, value) in fields {
        hasher.update(name.as_bytes());
        match value {
            Some(v) => {
                hasher.update(b"=");
                hasher.update(v.as_bytes());
            }
            None => hasher.update(b"\0"),
        }
        hasher.update(b"\x1f");
    }
    for (key, value) in extra {
        hasher.update(b"extra.");
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\x1f");
    }
    format!("{:x}", hasher.finalize())
}

/// Stable id for sources that do not assign one: hash of the normalized
/// title, location and posting URL.
pub fn derive_external_id(title: &str, location: Option<&str>, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(location.unwrap_or_default().as_bytes());
    hasher.update(b"\x1f");
    hasher.update(url.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("derived-{}", &digest[..32])
}
