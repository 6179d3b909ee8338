//! Search-indexing worker configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchIndexingConfig {
    pub concurrency: usize,
    pub rate_per_sec: u32,
}

impl Default for SearchIndexingConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            rate_per_sec: 20,
        }
    }
}

impl SearchIndexingConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            concurrency: std::env::var("SEARCH_INDEXING_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.concurrency),
            rate_per_sec: std::env::var("SEARCH_INDEXING_RATE_PER_SEC")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.rate_per_sec),
        }
    }
}
