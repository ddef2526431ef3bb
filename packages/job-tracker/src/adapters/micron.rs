//! Micron careers API adapter.
//!
//! The API returns `{ "count": N, "positions": [...] }` and pages with
//! `start`/`num` query parameters.

use chrono::{TimeZone, Utc};
use serde_json::Value;
use url::Url;

use super::{query_param, string_field};
use crate::error::{ExtractResult, ExtractionError};
use crate::traits::adapter::{Extraction, SourceAdapter};
use crate::traits::transport::{FetchRequest, RawContent};
use crate::types::config::FetchOptions;
use crate::types::posting::JobPostingCandidate;

const API_URL: &str = "https://careers.micron.com/api/apply/v2/jobs";
const DEFAULT_PAGE_SIZE: usize = 10;

pub struct MicronAdapter {
    api_url: String,
    page_size: usize,
}

impl Default for MicronAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MicronAdapter {
    pub fn new() -> Self {
        Self {
            api_url: API_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Point the adapter at another endpoint (tests, mirrors).
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn request_at(&self, start: usize) -> FetchRequest {
        let url = match Url::parse(&self.api_url) {
            Ok(mut url) => {
                url.query_pairs_mut()
                    .append_pair("domain", "micron.com")
                    .append_pair("start", &start.to_string())
                    .append_pair("num", &self.page_size.to_string())
                    .append_pair("sort_by", "relevance");
                url.to_string()
            }
            // An unparseable endpoint surfaces as a permanent fetch failure
            Err(_) => self.api_url.clone(),
        };
        FetchRequest::get(url)
    }

    fn parse_position(&self, index: usize, job: &Value) -> Result<JobPostingCandidate, String> {
        if !job.is_object() {
            return Err(format!("position {} is not an object", index));
        }
        let title = string_field(job, &["name"]).ok_or("missing name")?;
        let url = string_field(job, &["canonicalPositionUrl"]).ok_or("missing canonicalPositionUrl")?;

        let mut candidate = JobPostingCandidate::new(title, url);
        candidate.external_id = string_field(job, &["ats_job_id", "id"]);
        candidate.location = string_field(job, &["location"]);
        candidate.department = string_field(job, &["department"]);
        candidate.description = string_field(job, &["job_description"]);
        // Unparseable creation times fall back to first-observed time
        candidate.posted_at = job
            .get("t_create")
            .and_then(Value::as_i64)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

        if let Some(business_unit) = string_field(job, &["business_unit"]) {
            candidate.extra.insert("business_unit".to_string(), business_unit);
        }
        Ok(candidate)
    }
}

fn parse_body(raw: &RawContent) -> ExtractResult<Value> {
    serde_json::from_str(&raw.body)
        .map_err(|e| ExtractionError::fatal(format!("response is not JSON: {}", e)))
}

impl SourceAdapter for MicronAdapter {
    fn name(&self) -> &str {
        "Micron"
    }

    fn first_request(&self) -> FetchRequest {
        self.request_at(0)
    }

    fn next_request(&self, previous: &FetchRequest, raw: &RawContent) -> Option<FetchRequest> {
        let data: Value = serde_json::from_str(&raw.body).ok()?;
        let total = data.get("count").and_then(Value::as_u64)? as usize;
        let returned = data.get("positions").and_then(Value::as_array)?.len();
        if returned == 0 {
            return None;
        }

        let start = query_param(&previous.url, "start").unwrap_or(0);
        let num = query_param(&previous.url, "num").unwrap_or(self.page_size);
        let next = start + num;
        (next < total).then(|| self.request_at(next))
    }

    fn extract(&self, raw: &RawContent) -> ExtractResult<Extraction> {
        let data = parse_body(raw)?;
        let positions = data
            .get("positions")
            .and_then(Value::as_array)
            .ok_or_else(|| ExtractionError::fatal("missing positions array"))?;

        let mut extraction = Extraction::new();
        for (index, job) in positions.iter().enumerate() {
            match self.parse_position(index, job) {
                Ok(candidate) => extraction.push(candidate),
                Err(reason) => extraction.skip(index, reason),
            }
        }
        Ok(extraction)
    }

    fn fetch_options(&self) -> Option<FetchOptions> {
        Some(
            FetchOptions::new()
                .with_header("Accept", "*/*")
                .with_header("Accept-Language", "en-US,en;q=0.5")
                .with_header("Referer", "https://careers.micron.com/careers")
                .with_header("Content-Type", "application/json"),
        )
    }
}
