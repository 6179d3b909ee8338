//! Payment coordinator configuration: webhook retry backoff and the
//! reconciliation sweep.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaymentConfig {
    pub reconciliation_concurrency: usize,
    pub reconciliation_rate_per_min: u32,
    pub webhook_retry_concurrency: usize,
    pub webhook_retry_base_ms: u64,
    pub webhook_retry_cap_ms: u64,
    pub webhook_max_attempts: i32,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            reconciliation_concurrency: 2,
            reconciliation_rate_per_min: 20,
            webhook_retry_concurrency: 3,
            webhook_retry_base_ms: 2_000,
            webhook_retry_cap_ms: 32_000,
            webhook_max_attempts: 5,
        }
    }
}

impl PaymentConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            reconciliation_concurrency: std::env::var("PAYMENT_RECONCILIATION_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.reconciliation_concurrency),
            reconciliation_rate_per_min: std::env::var("PAYMENT_RECONCILIATION_RATE_PER_MIN")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.reconciliation_rate_per_min),
            webhook_retry_concurrency: std::env::var("PAYMENT_WEBHOOK_RETRY_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.webhook_retry_concurrency),
            webhook_retry_base_ms: std::env::var("PAYMENT_WEBHOOK_RETRY_BASE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.webhook_retry_base_ms),
            webhook_retry_cap_ms: std::env::var("PAYMENT_WEBHOOK_RETRY_CAP_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.webhook_retry_cap_ms),
            webhook_max_attempts: std::env::var("PAYMENT_WEBHOOK_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.webhook_max_attempts),
        }
    }

    /// `min(cap, base * 2^(attempt-1))`, attempt is 1-indexed.
    pub fn webhook_backoff_ms(&self, attempt: i32) -> u64 {
        let exp = self.webhook_retry_base_ms.saturating_mul(1u64 << (attempt - 1).max(0));
        exp.min(self.webhook_retry_cap_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_capped() {
        let config = PaymentConfig::default();
        assert_eq!(config.webhook_backoff_ms(1), 2_000);
        assert_eq!(config.webhook_backoff_ms(2), 4_000);
        assert_eq!(config.webhook_backoff_ms(10), 32_000);
    }
}
