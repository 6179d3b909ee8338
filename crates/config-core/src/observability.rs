//! Logging and metrics configuration shared by every worker and binary.

use serde::{Deserialize, Serialize};

/// Observability configuration: how to log, and how often to export gauges.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl ObservabilityConfig {
    pub fn from_env() -> Self {
        Self {
            logging: LoggingConfig::from_env(),
            metrics: MetricsConfig::from_env(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default log level when `RUST_LOG` isn't set
    pub level: LogLevel,
    /// Pretty (human) output for local dev, compact for production
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        let level = std::env::var("LOG_LEVEL")
            .ok()
            .and_then(|v| LogLevel::from_str(&v))
            .unwrap_or(LogLevel::Info);
        let format = std::env::var("LOG_FORMAT")
            .ok()
            .map(|v| match v.to_lowercase().as_str() {
                "pretty" => LogFormat::Pretty,
                "json" => LogFormat::Json,
                _ => LogFormat::Compact,
            })
            .unwrap_or(LogFormat::Compact);
        Self { level, format }
    }

    /// Filter string handed to `tracing_subscriber::EnvFilter`.
    pub fn filter_string(&self) -> String {
        format!("{},commerce=debug", self.level)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn from_str(s: &str) -> Option<Self> {
        Some(match s.to_lowercase().as_str() {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" => Self::Warn,
            "error" => Self::Error,
            _ => return None,
        })
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// Internal gauge export cadence. Exposition (a `/metrics` endpoint) is out
/// of scope; this only controls how often in-process gauges are refreshed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub export_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            export_interval_secs: 10,
        }
    }
}

impl MetricsConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: std::env::var("METRICS_ENABLED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
            export_interval_secs: std::env::var("METRICS_EXPORT_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_string_includes_level() {
        let cfg = LoggingConfig {
            level: LogLevel::Warn,
            format: LogFormat::Compact,
        };
        assert!(cfg.filter_string().starts_with("warn"));
    }

    #[test]
    fn metrics_defaults() {
        let config = MetricsConfig::default();
        assert!(config.enabled);
        assert_eq!(config.export_interval_secs, 10);
    }
}
