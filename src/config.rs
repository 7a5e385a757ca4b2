//! Gateway configuration: host, pool sizing, timeouts and retry policy.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or validating a [`GatewayConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid gateway configuration: {reason}")]
    Invalid { reason: String },
}

/// Static configuration of the gateway. Every key is optional in TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub min_connections: usize,
    pub max_connections: usize,
    /// How long `acquire` waits for a free connection.
    pub pool_timeout_ms: u64,
    pub keep_alive: bool,
    pub tcp_no_delay: bool,
    /// Total tries per send; 0 behaves like 1.
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    /// Width in bytes of the big-endian frame length prefix.
    pub length_header_size: usize,
    /// How long shutdown waits for checked-out connections.
    pub shutdown_grace_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5000,
            connect_timeout_ms: 30_000,
            read_timeout_ms: 30_000,
            min_connections: 2,
            max_connections: 10,
            pool_timeout_ms: 5_000,
            keep_alive: true,
            tcp_no_delay: true,
            retry_attempts: 3,
            retry_delay_ms: 1_000,
            max_retry_delay_ms: 10_000,
            length_header_size: 2,
            shutdown_grace_ms: 5_000,
        }
    }
}

impl GatewayConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| {
            Err(ConfigError::Invalid {
                reason: reason.to_string(),
            })
        };
        if self.host.trim().is_empty() {
            return invalid("host must not be empty");
        }
        if self.port == 0 {
            return invalid("port must be non-zero");
        }
        if self.max_connections == 0 {
            return invalid("max_connections must be >= 1");
        }
        if self.min_connections > self.max_connections {
            return invalid("min_connections must not exceed max_connections");
        }
        if !(1..=4).contains(&self.length_header_size) {
            return invalid("length_header_size must be between 1 and 4");
        }
        Ok(())
    }

    /// `host:port`, as handed to the resolver.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn pool_timeout(&self) -> Duration {
        Duration::from_millis(self.pool_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
