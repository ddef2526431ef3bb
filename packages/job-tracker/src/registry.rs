//! Adapter registry mapping source ids to adapters.
//!
//! Sources are registered once at startup. The pipeline looks adapters up by
//! `source_id` and runs them in registration order.
//!
//! # Example
//!
//! ```ignore
//! let mut registry = AdapterRegistry::new();
//! registry.register("micron", Arc::new(MicronAdapter::new()))?;
//!
//! let adapter = registry.get("micron")?;
//! ```

use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{ConfigurationError, NotFoundError};
use crate::traits::adapter::SourceAdapter;
use crate::types::posting::normalize_text;

/// Registry of source adapters keyed by `source_id`.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: IndexMap<String, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under `source_id`.
    ///
    /// Returns an error if the id is blank, carries stray whitespace, or is
    /// already taken.
    pub fn register(
        &mut self,
        source_id: impl Into<String>,
        adapter: Arc<dyn SourceAdapter>,
    ) -> Result<(), ConfigurationError> {
        let source_id = source_id.into();
        if source_id.trim().is_empty() {
            return Err(ConfigurationError::EmptySourceId);
        }
        if normalize_text(&source_id) != source_id {
            return Err(ConfigurationError::InvalidOption {
                name: "source_id".to_string(),
                reason: format!("{:?} has leading, trailing or repeated whitespace", source_id),
            });
        }
        if self.adapters.contains_key(&source_id) {
            return Err(ConfigurationError::DuplicateSource(source_id));
        }
        self.adapters.insert(source_id, adapter);
        Ok(())
    }

    pub fn get(&self, source_id: &str) -> Result<Arc<dyn SourceAdapter>, NotFoundError> {
        self.adapters
            .get(source_id)
            .cloned()
            .ok_or_else(|| NotFoundError {
                source_id: source_id.to_string(),
            })
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.adapters.contains_key(source_id)
    }

    /// Registered source ids in registration order.
    pub fn list_sources(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
