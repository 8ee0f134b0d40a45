//! Configuration for the register monitor.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use modsight_common::LoggingConfig;

use crate::protocol::MAX_READ_QUANTITY;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Devices to poll at startup. The registry can be edited at runtime;
    /// this list only seeds it, so it may be empty.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    /// Shared register-read and scheduling parameters.
    #[serde(default)]
    pub poll: PollConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// A single Modbus TCP device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Display name (not protocol-relevant).
    pub name: String,

    /// Host address (IP or hostname).
    pub host: String,

    /// TCP port (default: 502).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Modbus unit/slave id (default: 1).
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,
}

impl DeviceConfig {
    /// "host:port" form used in logs and error messages.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_port() -> u16 {
    502
}

fn default_unit_id() -> u8 {
    1
}

/// Register-read and scheduling parameters shared by all devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Starting register address (0-based).
    #[serde(default)]
    pub start_address: u16,

    /// Number of holding registers to read (1-125).
    #[serde(default = "default_quantity")]
    pub quantity: u16,

    /// Seconds between poll passes.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Per-attempt exchange timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_quantity() -> u16 {
    1
}

fn default_interval_secs() -> u64 {
    10
}

fn default_timeout_ms() -> u64 {
    1000
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            start_address: 0,
            quantity: default_quantity(),
            interval_secs: default_interval_secs(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: MonitorConfig = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll.quantity == 0 || self.poll.quantity > MAX_READ_QUANTITY {
            return Err(ConfigError::Validation(format!(
                "poll.quantity must be 1-{}, got {}",
                MAX_READ_QUANTITY, self.poll.quantity
            )));
        }

        if self.poll.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "poll.interval_secs must be at least 1".to_string(),
            ));
        }

        if self.poll.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "poll.timeout_ms must be at least 1".to_string(),
            ));
        }

        for device in &self.devices {
            if device.name.is_empty() {
                return Err(ConfigError::Validation(
                    "Device name cannot be empty".to_string(),
                ));
            }

            if device.host.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Device '{}': host cannot be empty",
                    device.name
                )));
            }

            if device.port == 0 {
                return Err(ConfigError::Validation(format!(
                    "Device '{}': port must be 1-65535",
                    device.name
                )));
            }
        }

        Ok(())
    }
}
