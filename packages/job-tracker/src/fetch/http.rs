//! HTTP transport backed by reqwest.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use tracing::debug;

use crate::error::TransportError;
use crate::traits::transport::{FetchRequest, HttpMethod, RawContent, Transport};

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:136.0) Gecko/20100101 Firefox/136.0";

/// Plain HTTP transport. No JavaScript rendering.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with a browser-like user agent.
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| TransportError::Malformed(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Use a caller-provided client (proxies, TLS settings, credentials).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::Malformed(format!("header name {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::Malformed(format!("header value for {}: {}", name, e)))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_builder() {
        TransportError::Malformed(err.to_string())
    } else {
        TransportError::Connection(err.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: &FetchRequest,
        headers: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<RawContent, TransportError> {
        let builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        let mut builder = builder.headers(header_map(headers)?).timeout(timeout);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = response.text().await.map_err(map_reqwest_error)?;
        debug!(url = %request.url, status, bytes = body.len(), "HTTP response received");

        Ok(RawContent {
            url: request.url.clone(),
            status,
            body,
            content_type,
            fetched_at: Utc::now(),
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}
