//! Core traits for the transport layer.
//!
//! `ByteSink` is the readable/writable stream behind one open port and
//! `Transport` enumerates and opens those streams. Real hardware and the
//! in-memory mock implement both, so everything above this module can be
//! exercised without a device attached.

use super::error::PortError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Baud rate used when the caller does not pick one.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Timeout applied to opening the device and to blocking reads.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// How often the hardware watcher samples the receive buffer.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Callback raised by a sink whenever data may be available.
///
/// Implementations call it from whatever thread observes the data, so it must
/// return quickly and never block.
pub type DataNotify = Arc<dyn Fn() + Send + Sync>;

/// Parameters used to open a sink.
///
/// Framing on the wire is always 8 data bits, no parity, 1 stop bit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfiguration {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Open and read timeout.
    pub timeout: Duration,

    /// Sampling interval for the data-available watcher.
    pub poll_interval: Duration,
}

impl PortConfiguration {
    /// Default configuration at the given baud rate.
    pub fn with_baud(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Self::default()
        }
    }
}

impl Default for PortConfiguration {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// One entry of the system's port list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortIdentifier {
    /// Path or name used to open the port (e.g. "/dev/ttyUSB0" or "COM3").
    pub name: String,

    /// Human readable description, when the platform reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PortIdentifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

/// The byte stream behind one open port.
///
/// A sink is exclusively owned by a single [`Port`](crate::Port); the
/// listener worker and the writer share it through a mutex, never
/// concurrently.
pub trait ByteSink: Send + std::fmt::Debug {
    /// Name/path of the underlying device.
    fn name(&self) -> &str;

    /// Read one byte, blocking until it arrives or the read timeout expires.
    fn read_byte(&mut self) -> Result<u8, PortError>;

    /// Number of bytes that can be read without blocking.
    fn available(&self) -> Result<usize, PortError>;

    /// Discard up to `count` received bytes. Returns how many were dropped.
    fn skip(&mut self, count: usize) -> Result<usize, PortError> {
        for skipped in 0..count {
            match self.read_byte() {
                Ok(_) => {}
                Err(e) if e.is_would_block() => return Ok(skipped),
                Err(e) => return Err(e),
            }
        }
        Ok(count)
    }

    /// Write every byte of `data`.
    fn write(&mut self, data: &[u8]) -> Result<(), PortError>;

    /// Block until written data has been handed to the device.
    fn flush(&mut self) -> Result<(), PortError>;

    /// Start raising `on_data` when bytes arrive. Replaces any earlier callback.
    fn arm_notify(&mut self, on_data: DataNotify) -> Result<(), PortError>;

    /// Stop raising the data-available callback. Safe to call when unarmed.
    fn disarm_notify(&mut self);

    /// Release the device. Later calls fail with [`PortError::NotOpen`].
    fn close(&mut self) {
        self.disarm_notify();
    }
}

/// Enumerates ports and opens sinks for them.
pub trait Transport: Send + Sync {
    /// Ports currently present, in platform order.
    fn list_port_identifiers(&self) -> Result<Vec<PortIdentifier>, PortError>;

    /// Open the port named by `id`.
    fn open(
        &self,
        id: &PortIdentifier,
        config: &PortConfiguration,
    ) -> Result<Box<dyn ByteSink>, PortError>;
}
