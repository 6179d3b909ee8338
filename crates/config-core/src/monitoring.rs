//! Queue-depth monitoring thresholds for the health aggregation worker.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    pub poll_ms: u64,
    pub warn_waiting: i64,
    pub warn_failed: i64,
    pub warn_delayed: i64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            poll_ms: 30_000,
            warn_waiting: 100,
            warn_failed: 50,
            warn_delayed: 1_000,
        }
    }
}

impl MonitoringConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            poll_ms: std::env::var("MONITORING_POLL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.poll_ms),
            warn_waiting: std::env::var("MONITORING_WARN_WAITING")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.warn_waiting),
            warn_failed: std::env::var("MONITORING_WARN_FAILED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.warn_failed),
            warn_delayed: std::env::var("MONITORING_WARN_DELAYED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.warn_delayed),
        }
    }
}
