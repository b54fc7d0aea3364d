use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::ConfigError;

fn default_category() -> String {
    "general".to_string()
}

/// A named feed to collect from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Source {
    pub name: String,
    /// `http(s)://` or `file://` URL
    pub url: String,
    #[serde(default = "default_category")]
    pub category: String,
}

impl Source {
    pub fn new(name: impl Into<String>, url: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            category: category.into(),
        }
    }
}

/// Ordered, immutable list of sources.
///
/// Insertion order is the crawl order within a cycle. Cloning shares the
/// underlying slice.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: Arc<[Source]>,
}

impl SourceRegistry {
    /// Fails with [`ConfigError::NoSources`] for an empty list.
    pub fn new(sources: Vec<Source>) -> Result<Self, ConfigError> {
        if sources.is_empty() {
            return Err(ConfigError::NoSources);
        }
        Ok(Self {
            sources: sources.into(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
