//! Configuration file for an RS-485/Ethernet instrument.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::instrument::{DEFAULT_PORT, DEFAULT_SLAVE_ADDRESS, Instrument};
use crate::retry::RetryPolicy;
use crate::transport::{DEFAULT_BUFFER_SIZE, TcpTransport};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rs485EthConfig {
    /// Bridge endpoint
    pub connection: ConnectionConfig,

    /// Modbus slave address (1-247)
    #[serde(default = "default_slave_address")]
    pub slave_address: u8,

    /// Connect/read timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Receive buffer cap in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// IP address or hostname of the bridge
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_slave_address() -> u8 {
    DEFAULT_SLAVE_ADDRESS
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

/// Backoff used by pollers around each read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
        }
    }
}

fn default_attempts() -> u32 {
    4
}

fn default_initial_delay_ms() -> u64 {
    800
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.attempts, Duration::from_millis(self.initial_delay_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Rs485EthConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json5(&content)
    }

    pub fn from_json5(content: &str) -> Result<Self, ConfigError> {
        let config: Rs485EthConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.host.trim().is_empty() {
            return Err(ConfigError::Validation("connection.host cannot be empty".to_string()));
        }
        if self.connection.port == 0 {
            return Err(ConfigError::Validation("connection.port cannot be 0".to_string()));
        }
        if !(1..=247).contains(&self.slave_address) {
            return Err(ConfigError::Validation(format!(
                "slave_address must be 1-247, got {}",
                self.slave_address
            )));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Validation("timeout_ms must be greater than 0".to_string()));
        }
        if self.buffer_size < 4 {
            return Err(ConfigError::Validation(format!(
                "buffer_size must hold at least a 4-byte frame, got {}",
                self.buffer_size
            )));
        }
        if self.retry.attempts == 0 {
            return Err(ConfigError::Validation("retry.attempts must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn transport(&self) -> TcpTransport {
        TcpTransport::new(self.connection.host.clone(), self.connection.port)
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_buffer_size(self.buffer_size)
    }

    /// Builds a handle; no connection is opened until the first read.
    pub fn instrument(&self) -> Instrument {
        Instrument::with_transport(self.transport()).with_slave_address(self.slave_address)
    }
}
