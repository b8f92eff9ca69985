//! Transport layer: the byte sinks behind open ports.
//!
//! Provides the `ByteSink` and `Transport` traits, a hardware implementation
//! over `serialport`, and an in-memory mock for tests.

pub mod error;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use error::PortError;
pub use mock::{MockSerialPort, MockTransport};
pub use sync_port::{SyncSerialPort, SystemTransport};
pub use traits::*;
