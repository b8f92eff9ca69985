//! Transport-level error types.
//!
//! These describe failures of a single `ByteSink` or `Transport` call. The
//! crate-level [`SerialError`](crate::error::SerialError) wraps them with the
//! path of the port they happened on.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by a byte sink or transport.
#[derive(Debug, Error)]
pub enum PortError {
    /// The requested port does not exist on this system.
    #[error("Serial port not found: {0}")]
    NotFound(String),

    /// An I/O error occurred while talking to the device.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The device rejected the requested configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No data arrived within the configured timeout.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The sink has already been closed.
    #[error("Port is not open")]
    NotOpen,

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PortError {
    /// Create a NotFound error from a port name.
    pub fn not_found(port_name: impl Into<String>) -> Self {
        Self::NotFound(port_name.into())
    }

    /// Create a Config error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a Timeout error from a duration.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout(duration)
    }

    /// Whether this error means "nothing to read yet" rather than a broken device.
    pub fn is_would_block(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::WouldBlock)
    }
}
