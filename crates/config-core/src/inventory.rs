//! Inventory reservation engine configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStrategyKind {
    Optimistic,
    Pessimistic,
}

impl ReservationStrategyKind {
    fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "optimistic" => Some(Self::Optimistic),
            "pessimistic" => Some(Self::Pessimistic),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InventoryConfig {
    pub reservation_ttl_seconds: i64,
    pub optimistic_cas_retries: u32,
    pub strategy_default: ReservationStrategyKind,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            reservation_ttl_seconds: 900,
            optimistic_cas_retries: 3,
            strategy_default: ReservationStrategyKind::Optimistic,
        }
    }
}

impl InventoryConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            reservation_ttl_seconds: std::env::var("INVENTORY_RESERVATION_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.reservation_ttl_seconds),
            optimistic_cas_retries: std::env::var("INVENTORY_OPTIMISTIC_CAS_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.optimistic_cas_retries),
            strategy_default: std::env::var("INVENTORY_STRATEGY_DEFAULT")
                .ok()
                .and_then(|v| ReservationStrategyKind::from_str(&v))
                .unwrap_or(default.strategy_default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = InventoryConfig::default();
        assert_eq!(config.reservation_ttl_seconds, 900);
        assert_eq!(config.optimistic_cas_retries, 3);
        assert_eq!(config.strategy_default, ReservationStrategyKind::Optimistic);
    }
}
