//! Redis configuration shared by the stream broker, task queue, and
//! idempotency store.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub database: u8,
    #[serde(skip_serializing)]
    pub password: Option<SecretString>,
    pub key_prefix: String,
    pub keep_alive: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            database: 0,
            password: None,
            key_prefix: "commerce:".to_string(),
            keep_alive: true,
        }
    }
}

impl RedisConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            host: std::env::var("REDIS_HOST").unwrap_or(default.host),
            port: std::env::var("REDIS_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),
            database: std::env::var("REDIS_DATABASE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.database),
            password: std::env::var("REDIS_PASSWORD").ok().map(SecretString::from),
            key_prefix: std::env::var("REDIS_KEY_PREFIX").unwrap_or(default.key_prefix),
            keep_alive: std::env::var("REDIS_KEEP_ALIVE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.keep_alive),
        }
    }

    pub fn connection_url(&self) -> SecretString {
        let auth = self
            .password
            .as_ref()
            .map(|p| format!(":{}@", p.expose_secret()))
            .unwrap_or_default();
        SecretString::from(format!(
            "redis://{}{}:{}/{}",
            auth, self.host, self.port, self.database
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_url_without_password() {
        let config = RedisConfig::default();
        let url = config.connection_url();
        assert_eq!(url.expose_secret(), "redis://localhost:6379/0");
    }

    #[test]
    fn connection_url_with_password() {
        let config = RedisConfig {
            password: Some(SecretString::from("hunter2")),
            ..RedisConfig::default()
        };
        assert!(config
            .connection_url()
            .expose_secret()
            .starts_with("redis://:hunter2@"));
    }
}
