//! Shared test utilities for serial event tests.
//!
//! - Mock port fixtures opened through `MockTransport`
//! - Collectors that record what listener callbacks receive
//! - An error sink for `Port::on_error`

#![allow(dead_code)]

use serial_events::port::{MockSerialPort, MockTransport, PortConfiguration};
use serial_events::{Port, SerialError};
use std::sync::{Arc, Mutex};

/// Name every fixture port is registered under.
pub const MOCK_PATH: &str = "MOCK0";

/// Open a port backed by a fresh mock device.
///
/// Returns the port and a handle sharing the device's buffers, used to feed
/// incoming bytes and inspect writes.
pub fn open_mock_port() -> (Port, MockSerialPort) {
    open_mock_port_with(&[])
}

/// Like [`open_mock_port`], with `pending` already buffered before the open.
pub fn open_mock_port_with(pending: &[u8]) -> (Port, MockSerialPort) {
    let device = MockSerialPort::new(MOCK_PATH);
    device.enqueue_read(pending);
    let transport = MockTransport::new().with_port(device.clone());
    let port = Port::open_with(&transport, MOCK_PATH, PortConfiguration::default())
        .expect("mock port should open");
    (port, device)
}

/// Records every unit handed to a callback.
#[derive(Clone)]
pub struct Collector<T> {
    seen: Arc<Mutex<Vec<T>>>,
}

impl<T: Clone + Send + 'static> Collector<T> {
    pub fn new() -> Self {
        Self {
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A callback that appends to this collector.
    pub fn handler(&self) -> impl FnMut(T) + Send + 'static {
        let seen = Arc::clone(&self.seen);
        move |unit| seen.lock().unwrap().push(unit)
    }

    pub fn items(&self) -> Vec<T> {
        self.seen.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

/// Captures the messages of errors passed to `Port::on_error`.
pub fn capture_errors(port: &Port) -> Arc<Mutex<Vec<String>>> {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    port.on_error(move |err: &SerialError| sink.lock().unwrap().push(err.to_string()));
    errors
}
