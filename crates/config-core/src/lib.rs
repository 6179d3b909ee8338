//! Unified configuration management for the commerce transactional core.
//!
//! Each component owns a small typed config struct with a `Default` and an
//! `from_env()` that reads `SCREAMING_SNAKE_CASE` environment variables,
//! falling back to the default on anything missing or unparsable. There is
//! no central `Config::load()`: binaries assemble the pieces they need.

use serde::{Deserialize, Serialize};

pub mod inventory;
pub mod monitoring;
pub mod observability;
pub mod outbox;
pub mod payment;
pub mod redis;
pub mod search_indexing;

pub use inventory::InventoryConfig;
pub use monitoring::MonitoringConfig;
pub use observability::ObservabilityConfig;
pub use outbox::OutboxConfig;
pub use payment::PaymentConfig;
pub use redis::RedisConfig;
pub use search_indexing::SearchIndexingConfig;

/// Deployment environment. Only affects logging defaults; there are no
/// environment-gated feature toggles in this workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Local,
    Development,
    Staging,
    Production,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Development
    }
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Environment::Local)
    }

    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "local" | "loc" => Ok(Environment::Local),
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "stage" | "stg" => Ok(Environment::Staging),
            "production" | "prod" | "prd" => Ok(Environment::Production),
            _ => Err(format!("unknown environment: {}", s)),
        }
    }

    pub fn from_env() -> Self {
        std::env::var("ENVIRONMENT")
            .or_else(|_| std::env::var("ENV"))
            .ok()
            .and_then(|v| Self::from_str(&v).ok())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parsing() {
        assert_eq!(Environment::from_str("prod").unwrap(), Environment::Production);
        assert_eq!(Environment::from_str("dev").unwrap(), Environment::Development);
        assert_eq!(Environment::from_str("local").unwrap(), Environment::Local);
        assert!(Environment::from_str("invalid").is_err());
    }

    #[test]
    fn test_environment_checks() {
        let prod = Environment::Production;
        assert!(prod.is_production());
        assert!(!prod.is_local());

        let local = Environment::Local;
        assert!(!local.is_production());
        assert!(local.is_local());
    }
}
