//! Serial Events Library
//!
//! Event-driven access to serial ports: open a port, write typed values as
//! bytes, and receive incoming data through callbacks framed as single bytes
//! or fixed-size chunks.
//!
//! # Modules
//!
//! - `port`: transport layer (`ByteSink`, `Transport`, hardware and mock sinks)
//! - `encoder`: outbound value normalization
//! - `framer`: framing policies
//! - `listener`: per-port listener registry and worker
//! - `connection`: the `Port` lifecycle
//! - `config`: configuration management with TOML support
//! - `logging`: tracing subscriber setup
//! - `error`: crate-level errors
//!
//! # Example
//!
//! ```
//! use serial_events::port::{MockSerialPort, MockTransport, PortConfiguration};
//! use serial_events::Port;
//! use std::sync::mpsc;
//!
//! let device = MockSerialPort::new("MOCK0");
//! let transport = MockTransport::new().with_port(device.clone());
//! let port = Port::open_with(&transport, "MOCK0", PortConfiguration::default())?;
//!
//! let (tx, rx) = mpsc::channel();
//! port.on_n_bytes(2, move |chunk| tx.send(chunk).unwrap(), true)?;
//! device.enqueue_read(&[0xAB, 0xCD]);
//! port.settle();
//! assert_eq!(rx.try_recv().unwrap(), vec![0xAB, 0xCD]);
//!
//! port.write(65u8)?;
//! assert_eq!(device.written_bytes(), vec![0x41]);
//! # Ok::<(), serial_events::SerialError>(())
//! ```

pub mod config;
pub mod connection;
pub mod encoder;
pub mod error;
pub mod framer;
pub mod listener;
pub mod logging;
pub mod port;

pub use connection::{ChunkReceiver, Port};
pub use encoder::{encode, encode_json, OutboundValue};
pub use error::{SerialError, SerialResult};
pub use framer::{ByteFramer, ChunkFramer, Framer, SinkFramer};
pub use listener::{ErrorHandler, ListenOptions, ListenerState, OnConflict, Registration};
pub use port::{
    ByteSink, MockSerialPort, MockTransport, PortConfiguration, PortError, PortIdentifier,
    SyncSerialPort, SystemTransport, Transport, DEFAULT_BAUD_RATE,
};

pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
