//! Source adapter implementations.
//!
//! - `MicronAdapter` - Micron careers JSON API (offset pagination)
//! - `AsmlAdapter` - ASML job search via the Sitecore discover API
//! - `HtmlListingAdapter` - selector-driven adapter for static career pages

mod asml;
mod html;
mod micron;

pub use asml::AsmlAdapter;
pub use html::{HtmlListingAdapter, HtmlSelectors};
pub use micron::MicronAdapter;

use std::sync::Arc;

use serde_json::Value;

use crate::config::Config;
use crate::error::ConfigurationError;
use crate::registry::AdapterRegistry;

/// Registry with every built-in source.
pub fn default_registry(config: &Config) -> Result<AdapterRegistry, ConfigurationError> {
    let mut registry = AdapterRegistry::new();
    registry.register("micron", Arc::new(MicronAdapter::new()))?;

    let user_uuid = config
        .asml_user_uuid
        .clone()
        .unwrap_or_else(|| format!("job-tracker-{}", uuid::Uuid::new_v4()));
    let mut asml = AsmlAdapter::new(user_uuid);
    if let Some(token) = &config.asml_auth_token {
        asml = asml.with_auth_token(token.clone());
    }
    registry.register("asml", Arc::new(asml))?;

    Ok(registry)
}

/// First present key rendered as a string. Numbers are accepted as ids.
pub(crate) fn string_field(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match item.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(values) => {
            let parts: Vec<&str> = values.iter().filter_map(Value::as_str).collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        _ => None,
    })
}

/// Read a `usize` query parameter from a URL.
pub(crate) fn query_param(url: &str, name: &str) -> Option<usize> {
    let parsed = url::Url::parse(url).ok()?;
    let value = parsed
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())?;
    value.parse().ok()
}
