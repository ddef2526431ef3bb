//! ASML adapter for the Sitecore discover search API.

use serde_json::{json, Value};

use super::string_field;
use crate::error::{ExtractResult, ExtractionError};
use crate::traits::adapter::{Extraction, SourceAdapter};
use crate::traits::transport::{FetchRequest, RawContent};
use crate::types::config::FetchOptions;
use crate::types::posting::JobPostingCandidate;

const API_URL: &str = "https://discover-euc1.sitecorecloud.io/discover/v2/126200477";
const SITE_URL: &str = "https://www.asml.com";
const PAGE_URI: &str = "https://www.asml.com/en/careers/find-your-job?job_type=Fix";
const DEFAULT_PAGE_SIZE: usize = 100;

pub struct AsmlAdapter {
    api_url: String,
    auth_token: Option<String>,
    user_uuid: String,
    page_size: usize,
}

impl AsmlAdapter {
    /// `user_uuid` identifies the search session to the discover API.
    pub fn new(user_uuid: impl Into<String>) -> Self {
        Self {
            api_url: API_URL.to_string(),
            auth_token: None,
            user_uuid: user_uuid.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn search_payload(&self, offset: usize) -> Value {
        json!({
            "context": {
                "page": { "uri": PAGE_URI },
                "locale": { "country": "us", "language": "en" },
                "user": { "uuid": self.user_uuid }
            },
            "widget": {
                "items": [{
                    "entity": "content",
                    "rfk_id": "asml_job_search",
                    "search": {
                        "limit": self.page_size,
                        "offset": offset,
                        "content": {},
                        "filter": {
                            "type": "and",
                            "filters": [
                                { "name": "job_type", "values": ["Fix"], "type": "anyOf" }
                            ]
                        }
                    }
                }]
            }
        })
    }

    fn request_at(&self, offset: usize) -> FetchRequest {
        FetchRequest::post_json(&self.api_url, &self.search_payload(offset))
    }

    fn parse_item(&self, index: usize, job: &Value) -> Result<JobPostingCandidate, String> {
        if !job.is_object() {
            return Err(format!("item {} is not an object", index));
        }
        let title = string_field(job, &["name", "title"]).ok_or("missing name")?;
        let link = string_field(job, &["url", "job_url", "link"]).ok_or("missing url")?;
        let url = absolute_url(&link).ok_or_else(|| format!("unusable url: {}", link))?;

        let mut candidate = JobPostingCandidate::new(title, url);
        candidate.external_id = string_field(job, &["job_id", "id"]);
        candidate.location = string_field(job, &["location", "job_location", "city", "country"]);
        candidate.department = string_field(job, &["job_category", "department", "discipline"]);
        candidate.description = string_field(job, &["description", "job_description"]);
        Ok(candidate)
    }
}

/// Listing links come back site-relative.
fn absolute_url(link: &str) -> Option<String> {
    let base = url::Url::parse(SITE_URL).ok()?;
    base.join(link.trim()).ok().map(|u| u.to_string())
}

/// The first widget carries the search results.
fn results_widget(body: &str) -> ExtractResult<Value> {
    let mut data: Value = serde_json::from_str(body)
        .map_err(|e| ExtractionError::fatal(format!("response is not JSON: {}", e)))?;
    data.get_mut("widgets")
        .and_then(Value::as_array_mut)
        .filter(|widgets| !widgets.is_empty())
        .map(|widgets| widgets.swap_remove(0))
        .ok_or_else(|| ExtractionError::fatal("missing widgets"))
}

fn requested_offset(request: &FetchRequest) -> Option<usize> {
    let body: Value = serde_json::from_str(request.body.as_deref()?).ok()?;
    body.pointer("/widget/items/0/search/offset")?
        .as_u64()
        .map(|offset| offset as usize)
}

impl SourceAdapter for AsmlAdapter {
    fn name(&self) -> &str {
        "ASML"
    }

    fn first_request(&self) -> FetchRequest {
        self.request_at(0)
    }

    fn next_request(&self, previous: &FetchRequest, raw: &RawContent) -> Option<FetchRequest> {
        let widget = results_widget(&raw.body).ok()?;
        let total = widget.get("total_item").and_then(Value::as_u64)? as usize;
        let returned = widget.get("content").and_then(Value::as_array)?.len();
        if returned == 0 {
            return None;
        }

        let next = requested_offset(previous)? + self.page_size;
        (next < total).then(|| self.request_at(next))
    }

    fn extract(&self, raw: &RawContent) -> ExtractResult<Extraction> {
        let widget = results_widget(&raw.body)?;
        let content = widget
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| ExtractionError::fatal("missing content array"))?;

        let mut extraction = Extraction::new();
        for (index, job) in content.iter().enumerate() {
            match self.parse_item(index, job) {
                Ok(candidate) => extraction.push(candidate),
                Err(reason) => extraction.skip(index, reason),
            }
        }
        Ok(extraction)
    }

    fn fetch_options(&self) -> Option<FetchOptions> {
        let mut options = FetchOptions::new()
            .with_header("Accept", "application/json")
            .with_header("Accept-Language", "en-US,en;q=0.5")
            .with_header("Sec-Fetch-Dest", "empty")
            .with_header("Sec-Fetch-Mode", "cors")
            .with_header("Sec-Fetch-Site", "cross-site");
        if let Some(token) = &self.auth_token {
            options = options.with_header("authorization", token.clone());
        }
        Some(options)
    }
}
