//! Transactional outbox publisher configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutboxConfig {
    pub polling_interval_ms: u64,
    pub batch_size: i64,
    pub max_attempts: i32,
    pub dlq_retention_days: i64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            polling_interval_ms: 5_000,
            batch_size: 100,
            max_attempts: 5,
            dlq_retention_days: 7,
        }
    }
}

impl OutboxConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            polling_interval_ms: std::env::var("OUTBOX_POLLING_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.polling_interval_ms),
            batch_size: std::env::var("OUTBOX_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.batch_size),
            max_attempts: std::env::var("OUTBOX_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_attempts),
            dlq_retention_days: std::env::var("OUTBOX_DLQ_RETENTION_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.dlq_retention_days),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = OutboxConfig::default();
        assert_eq!(config.polling_interval_ms, 5_000);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.max_attempts, 5);
    }
}
