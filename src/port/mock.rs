//! In-memory sink and transport for tests.
//!
//! `MockSerialPort` behaves like a device whose receive buffer is filled with
//! `enqueue_read`: every enqueue raises the armed data-available callback on
//! the calling thread, the way a driver would from its own thread.
//! `MockTransport` serves a fixed set of mock ports by name.

use super::error::PortError;
use super::traits::{ByteSink, DataNotify, PortConfiguration, PortIdentifier, Transport};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct MockPortState {
    /// Bytes waiting to be read.
    read_queue: VecDeque<u8>,
    /// Every successful write, in order.
    write_log: Vec<Vec<u8>>,
    flush_count: usize,
    /// Fail the next read with a timeout.
    should_timeout: bool,
    timeout: Duration,
    closed: bool,
}

/// Mock serial port.
///
/// Clones share state, so a test can keep one handle to feed bytes and
/// inspect writes while a [`Port`](crate::Port) owns another.
///
/// # Example
/// ```
/// use serial_events::port::{ByteSink, MockSerialPort};
///
/// let mut port = MockSerialPort::new("MOCK0");
/// port.enqueue_read(b"Hi");
/// assert_eq!(port.available().unwrap(), 2);
/// assert_eq!(port.read_byte().unwrap(), b'H');
///
/// port.write(&[0x41]).unwrap();
/// assert_eq!(port.written_bytes(), vec![0x41]);
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    name: String,
    state: Arc<Mutex<MockPortState>>,
    notify: Arc<Mutex<Option<DataNotify>>>,
}

impl MockSerialPort {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockPortState {
                timeout: crate::port::DEFAULT_TIMEOUT,
                ..Default::default()
            })),
            notify: Arc::new(Mutex::new(None)),
        }
    }

    /// Append bytes to the receive buffer and raise the armed callback.
    ///
    /// The callback runs after the state lock is released.
    pub fn enqueue_read(&self, data: &[u8]) {
        self.state.lock().read_queue.extend(data);
        let notify = self.notify.lock().clone();
        if let Some(on_data) = notify {
            on_data();
        }
    }

    /// Raise the armed callback without adding data.
    pub fn fire_spurious(&self) {
        let notify = self.notify.lock().clone();
        if let Some(on_data) = notify {
            on_data();
        }
    }

    /// Every write, one entry per call.
    pub fn get_write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// All written bytes, concatenated.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.state.lock().write_log.concat()
    }

    pub fn clear_write_log(&self) {
        self.state.lock().write_log.clear();
    }

    pub fn flush_count(&self) -> usize {
        self.state.lock().flush_count
    }

    /// Make the next read fail with [`PortError::Timeout`].
    pub fn set_should_timeout(&self, should_timeout: bool) {
        self.state.lock().should_timeout = should_timeout;
    }

    pub fn available_bytes(&self) -> usize {
        self.state.lock().read_queue.len()
    }

    pub fn is_armed(&self) -> bool {
        self.notify.lock().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl ByteSink for MockSerialPort {
    fn name(&self) -> &str {
        &self.name
    }

    /// Returns a `WouldBlock` I/O error instead of blocking when the buffer is empty.
    fn read_byte(&mut self) -> Result<u8, PortError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PortError::NotOpen);
        }
        if state.should_timeout {
            state.should_timeout = false;
            return Err(PortError::timeout(state.timeout));
        }
        state.read_queue.pop_front().ok_or_else(|| {
            PortError::Io(std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                "No data available",
            ))
        })
    }

    fn available(&self) -> Result<usize, PortError> {
        let state = self.state.lock();
        if state.closed {
            return Err(PortError::NotOpen);
        }
        Ok(state.read_queue.len())
    }

    fn skip(&mut self, count: usize) -> Result<usize, PortError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PortError::NotOpen);
        }
        let dropped = count.min(state.read_queue.len());
        state.read_queue.drain(..dropped);
        Ok(dropped)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), PortError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PortError::NotOpen);
        }
        if state.should_timeout {
            state.should_timeout = false;
            return Err(PortError::timeout(state.timeout));
        }
        state.write_log.push(data.to_vec());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), PortError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PortError::NotOpen);
        }
        state.flush_count += 1;
        Ok(())
    }

    fn arm_notify(&mut self, on_data: DataNotify) -> Result<(), PortError> {
        if self.state.lock().closed {
            return Err(PortError::NotOpen);
        }
        *self.notify.lock() = Some(on_data);
        Ok(())
    }

    fn disarm_notify(&mut self) {
        *self.notify.lock() = None;
    }

    fn close(&mut self) {
        self.disarm_notify();
        self.state.lock().closed = true;
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("available_bytes", &self.available_bytes())
            .field("armed", &self.is_armed())
            .finish()
    }
}

/// Transport serving registered mock ports.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    ports: Vec<MockSerialPort>,
    rejected: HashSet<String>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `port` listed and openable under its name.
    pub fn with_port(mut self, port: MockSerialPort) -> Self {
        self.ports.push(port);
        self
    }

    /// Keep `name` listed but make opening it fail, like a device in use.
    pub fn reject_open(mut self, name: impl Into<String>) -> Self {
        self.rejected.insert(name.into());
        self
    }
}

impl Transport for MockTransport {
    fn list_port_identifiers(&self) -> Result<Vec<PortIdentifier>, PortError> {
        Ok(self
            .ports
            .iter()
            .map(|p| PortIdentifier {
                name: p.name.clone(),
                description: Some("mock".to_string()),
            })
            .collect())
    }

    fn open(
        &self,
        id: &PortIdentifier,
        _config: &PortConfiguration,
    ) -> Result<Box<dyn ByteSink>, PortError> {
        if self.rejected.contains(&id.name) {
            return Err(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "device busy",
            )));
        }
        self.ports
            .iter()
            .find(|p| p.name == id.name)
            .map(|p| Box::new(p.clone()) as Box<dyn ByteSink>)
            .ok_or_else(|| PortError::not_found(&id.name))
    }
}
