//! Transport trait - the network boundary the fetch layer calls.
//!
//! The transport only moves bytes. Classifying failures, retrying and rate
//! limiting are the fetch layer's job, so a transport returns non-2xx
//! responses as ordinary `RawContent` values.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
}

/// A single outbound request for a source page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// POST with a JSON body; sets `Content-Type` accordingly.
    pub fn post_json(url: impl Into<String>, body: &serde_json::Value) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Self {
            url: url.into(),
            method: HttpMethod::Post,
            headers,
            body: Some(body.to_string()),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Merge static headers underneath the request's own.
    pub fn merged_headers(&self, defaults: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut headers = defaults.clone();
        for (k, v) in &self.headers {
            headers.insert(k.clone(), v.clone());
        }
        headers
    }
}

/// Raw content returned by a transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawContent {
    /// URL that was requested
    pub url: String,

    /// HTTP status (or the transport's equivalent)
    pub status: u16,

    pub body: String,

    pub content_type: Option<String>,

    pub fetched_at: DateTime<Utc>,
}

impl RawContent {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status,
            body: body.into(),
            content_type: None,
            fetched_at: Utc::now(),
        }
    }

    /// A 200 response, convenient for tests and fixtures.
    pub fn ok(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(url, 200, body)
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network client supplied by the caller (HTTP, proxies, credentials).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &FetchRequest,
        headers: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<RawContent, TransportError>;

    /// Get the transport name (for logging/debugging).
    fn name(&self) -> &str {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_headers_override_defaults() {
        let mut defaults = BTreeMap::new();
        defaults.insert("Accept".to_string(), "*/*".to_string());
        defaults.insert("User-Agent".to_string(), "job-tracker".to_string());

        let request = FetchRequest::get("https://example.com").with_header("Accept", "application/json");
        let merged = request.merged_headers(&defaults);

        assert_eq!(merged.get("Accept").map(String::as_str), Some("application/json"));
        assert_eq!(merged.get("User-Agent").map(String::as_str), Some("job-tracker"));
    }

    #[test]
    fn test_post_json_sets_body_and_content_type() {
        let request = FetchRequest::post_json("https://example.com/api", &serde_json::json!({"limit": 10}));

        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.body.as_deref(), Some(r#"{"limit":10}"#));
        assert_eq!(
            request.headers.get("Content-Type").map(String::as_str),
            Some("application/json")
        );
    }
}
