use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

use crate::types::config::{Backoff, FetchOptions, PipelineConfig};

const DEFAULT_DATABASE_URL: &str = "sqlite://job_listings.db?mode=rwc";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_concurrent_sources: usize,
    pub run_timeout: Option<Duration>,
    pub fetch_timeout: Duration,
    pub fetch_retries: u32,
    pub fetch_backoff: Duration,
    pub fetch_backoff_max: Duration,
    pub asml_auth_token: Option<String>,
    pub asml_user_uuid: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Unset keys take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            max_concurrent_sources: parse_or(&lookup, "MAX_CONCURRENT_SOURCES", 4)?,
            run_timeout: parse_opt::<u64>(&lookup, "RUN_TIMEOUT_SECS")?.map(Duration::from_secs),
            fetch_timeout: Duration::from_secs(parse_or(&lookup, "FETCH_TIMEOUT_SECS", 30)?),
            fetch_retries: parse_or(&lookup, "FETCH_RETRIES", 3)?,
            fetch_backoff: Duration::from_millis(parse_or(&lookup, "FETCH_BACKOFF_MS", 500)?),
            fetch_backoff_max: Duration::from_millis(parse_or(&lookup, "FETCH_BACKOFF_MAX_MS", 30_000)?),
            asml_auth_token: lookup("ASML_AUTH_TOKEN").filter(|v| !v.is_empty()),
            asml_user_uuid: lookup("ASML_USER_UUID").filter(|v| !v.is_empty()),
        })
    }

    /// Default fetch options for every source.
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions::new()
            .with_timeout(self.fetch_timeout)
            .with_retries(self.fetch_retries)
            .with_backoff(Backoff::Exponential {
                initial: self.fetch_backoff,
                factor: 2,
                max: self.fetch_backoff_max,
            })
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::new()
            .with_max_concurrent_sources(self.max_concurrent_sources)
            .with_default_fetch(self.fetch_options());
        if let Some(timeout) = self.run_timeout {
            config = config.with_run_timeout(timeout);
        }
        config
    }
}

fn parse_opt<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("{} must be a valid number, got {:?}", key, raw))
        })
        .transpose()
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(parse_opt(lookup, key)?.unwrap_or(default))
}
