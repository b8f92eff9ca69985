//! Configuration schema definitions.
//!
//! Every section derives serde with `#[serde(default)]`, so a file only needs
//! the keys it changes.

use super::error::{ConfigError, ConfigResult};
use crate::port::{PortConfiguration, DEFAULT_BAUD_RATE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Reject values no port can be opened with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.serial.default_baud == 0 {
            return Err(ConfigError::validation(
                "serial.default_baud",
                "must be greater than zero",
            ));
        }
        if self.serial.poll_interval_ms == 0 {
            return Err(ConfigError::validation(
                "serial.poll_interval_ms",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// `[serial]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Baud rate used when none is given on the command line
    pub default_baud: u32,
    /// Open and read timeout in milliseconds
    pub timeout_ms: u64,
    /// Data-available sampling interval in milliseconds
    pub poll_interval_ms: u64,
    /// Discard bytes buffered before a listener is bound
    pub skip_buffered: bool,
    /// Short names for port paths
    pub port_aliases: HashMap<String, String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            default_baud: DEFAULT_BAUD_RATE,
            timeout_ms: 2000,
            poll_interval_ms: 10,
            skip_buffered: true,
            port_aliases: HashMap::new(),
        }
    }
}

impl SerialConfig {
    /// Resolve a port name through aliases
    pub fn resolve_port(&self, name: &str) -> String {
        self.port_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// Open parameters, overriding the baud rate when given.
    pub fn port_configuration(&self, baud_rate: Option<u32>) -> PortConfiguration {
        PortConfiguration {
            baud_rate: baud_rate.unwrap_or(self.default_baud),
            timeout: Duration::from_millis(self.timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive: "trace", "debug", "info", "warn", "error" or a full `EnvFilter` string
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line output with colors
    #[default]
    Pretty,
    /// One line per event
    Compact,
}
