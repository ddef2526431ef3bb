//! Configuration types for fetching and pipeline runs.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Delay growth strategy between retry attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed { delay: Duration },

    /// `initial * factor^(retry - 1)`, capped at `max`.
    Exponential {
        initial: Duration,
        factor: u32,
        max: Duration,
    },
}

impl Backoff {
    /// Delay to wait before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        match self {
            Backoff::Fixed { delay } => *delay,
            Backoff::Exponential {
                initial,
                factor,
                max,
            } => {
                let exponent = retry.saturating_sub(1);
                let multiplier = factor.checked_pow(exponent).unwrap_or(u32::MAX);
                initial.saturating_mul(multiplier).min(*max)
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Exponential {
            initial: Duration::from_millis(500),
            factor: 2,
            max: Duration::from_secs(30),
        }
    }
}

/// Per-source fetch options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchOptions {
    /// Maximum wait for a single request.
    ///
    /// Default: 30s.
    pub timeout: Duration,

    /// Additional attempts after the first on transient failure.
    ///
    /// Default: 3.
    pub retries: u32,

    pub backoff: Backoff,

    /// Static request metadata. Request-specific headers win on conflict.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Outbound request ceiling for this source. `None` = unlimited.
    pub requests_per_second: Option<u32>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retries: 3,
            backoff: Backoff::default(),
            headers: BTreeMap::new(),
            requests_per_second: Some(2),
        }
    }
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_rate_limit(mut self, requests_per_second: Option<u32>) -> Self {
        self.requests_per_second = requests_per_second;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.timeout.is_zero() {
            return Err(ConfigurationError::InvalidOption {
                name: "timeout".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.requests_per_second == Some(0) {
            return Err(ConfigurationError::InvalidOption {
                name: "requests_per_second".to_string(),
                reason: "must be greater than zero when set".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Sources processed at the same time.
    ///
    /// Default: 4.
    pub max_concurrent_sources: usize,

    /// Cancel the run after this long. In-flight sources finish their current
    /// stage and end `Failed { Cancelled }`.
    pub run_timeout: Option<Duration>,

    /// Upper bound on pages walked per source.
    ///
    /// Default: 50.
    pub max_pages: usize,

    /// Options used when a source has no override and its adapter has no
    /// preference of its own.
    pub default_fetch: FetchOptions,

    /// Per-source overrides, keyed by source id.
    pub fetch_overrides: HashMap<String, FetchOptions>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sources: 4,
            run_timeout: None,
            max_pages: 50,
            default_fetch: FetchOptions::default(),
            fetch_overrides: HashMap::new(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrent_sources(mut self, n: usize) -> Self {
        self.max_concurrent_sources = n;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_default_fetch(mut self, options: FetchOptions) -> Self {
        self.default_fetch = options;
        self
    }

    pub fn with_fetch_override(mut self, source_id: impl Into<String>, options: FetchOptions) -> Self {
        self.fetch_overrides.insert(source_id.into(), options);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_concurrent_sources == 0 {
            return Err(ConfigurationError::InvalidOption {
                name: "max_concurrent_sources".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_pages == 0 {
            return Err(ConfigurationError::InvalidOption {
                name: "max_pages".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        self.default_fetch.validate()?;
        for options in self.fetch_overrides.values() {
            options.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_grows_and_caps() {
        let backoff = Backoff::Exponential {
            initial: Duration::from_millis(100),
            factor: 2,
            max: Duration::from_millis(500),
        };

        assert_eq!(backoff.delay_for(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(400));
        assert_eq!(backoff.delay_for(4), Duration::from_millis(500));
        assert_eq!(backoff.delay_for(40), Duration::from_millis(500));
    }

    #[test]
    fn test_fixed_backoff() {
        let backoff = Backoff::Fixed {
            delay: Duration::from_millis(250),
        };
        assert_eq!(backoff.delay_for(1), backoff.delay_for(9));
    }

    #[test]
    fn test_fetch_options_builder() {
        let options = FetchOptions::new()
            .with_timeout(Duration::from_secs(5))
            .with_retries(1)
            .with_header("Accept", "application/json")
            .with_rate_limit(None);

        assert_eq!(options.timeout, Duration::from_secs(5));
        assert_eq!(options.retries, 1);
        assert_eq!(options.headers.get("Accept").map(String::as_str), Some("application/json"));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_invalid_options_rejected() {
        assert!(FetchOptions::new().with_rate_limit(Some(0)).validate().is_err());
        assert!(FetchOptions::new().with_timeout(Duration::ZERO).validate().is_err());
        assert!(PipelineConfig::new().with_max_concurrent_sources(0).validate().is_err());
        assert!(PipelineConfig::new()
            .with_fetch_override("micron", FetchOptions::new().with_rate_limit(Some(0)))
            .validate()
            .is_err());
    }
}
