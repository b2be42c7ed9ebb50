//! Session configuration.
//!
//! All fields have defaults, so an empty JSON object is a valid config file.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Hard upper bound on a page size, regardless of configuration.
pub const MAX_PAGE_SIZE: i64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum number of cached table pages
    pub table_cache_capacity: usize,
    /// Lifetime of a cached table page, in seconds
    pub table_cache_ttl_secs: u64,
    /// Maximum number of cached ad-hoc statement results
    pub query_cache_capacity: usize,
    /// Lifetime of a cached ad-hoc result, in seconds
    pub query_cache_ttl_secs: u64,
    /// Largest `limit` a page request may ask for
    pub max_page_size: i64,
    /// Seed the demo dataset on `init`
    pub load_demo_on_init: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            table_cache_capacity: 100,
            table_cache_ttl_secs: 300,
            query_cache_capacity: 50,
            query_cache_ttl_secs: 120,
            max_page_size: MAX_PAGE_SIZE,
            load_demo_on_init: true,
        }
    }
}

impl SessionConfig {
    /// Load a config from a JSON file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = async_fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: SessionConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        tracing::debug!(?config, path = %path.display(), "Loaded session config");
        Ok(config.normalized())
    }

    /// Clamp values that would make the session misbehave.
    pub fn normalized(mut self) -> Self {
        self.max_page_size = self.max_page_size.clamp(1, MAX_PAGE_SIZE);
        self.table_cache_capacity = self.table_cache_capacity.max(1);
        self.query_cache_capacity = self.query_cache_capacity.max(1);
        self
    }

    pub fn table_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.table_cache_ttl_secs)
    }

    pub fn query_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.query_cache_ttl_secs)
    }
}
