//! Hardware-backed sink.
//!
//! Wraps the `serialport` crate's `SerialPort` with our `ByteSink` trait.
//! `serialport` has no data-available event, so arming starts a watcher
//! thread that samples `bytes_to_read` on a cloned handle and raises the
//! notification while the receive buffer is non-empty.

use super::error::PortError;
use super::traits::{ByteSink, DataNotify, PortConfiguration, PortIdentifier, Transport};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Sink over a real serial device, 8N1, no flow control.
pub struct SyncSerialPort {
    /// The underlying device; `None` once closed.
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
    poll_interval: Duration,
    watcher: Option<Watcher>,
}

struct Watcher {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl SyncSerialPort {
    /// Open a serial port with the given configuration.
    ///
    /// # Example
    /// ```no_run
    /// use serial_events::port::{PortConfiguration, SyncSerialPort};
    ///
    /// let port = SyncSerialPort::open("/dev/ttyUSB0", &PortConfiguration::with_baud(9600))?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(port_name: &str, config: &PortConfiguration) -> Result<Self, PortError> {
        let port = serialport::new(port_name, config.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(config.timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => PortError::not_found(port_name),
                serialport::ErrorKind::InvalidInput => PortError::config(e.to_string()),
                _ => PortError::Serial(e),
            })?;

        Ok(Self {
            port: Some(port),
            name: port_name.to_string(),
            poll_interval: config.poll_interval,
            watcher: None,
        })
    }

    fn device(&self) -> Result<&dyn serialport::SerialPort, PortError> {
        self.port.as_deref().ok_or(PortError::NotOpen)
    }

    fn device_mut(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>, PortError> {
        self.port.as_mut().ok_or(PortError::NotOpen)
    }
}

impl ByteSink for SyncSerialPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_byte(&mut self) -> Result<u8, PortError> {
        let mut byte = [0u8; 1];
        self.device_mut()?.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    fn available(&self) -> Result<usize, PortError> {
        Ok(self.device()?.bytes_to_read()? as usize)
    }

    fn skip(&mut self, count: usize) -> Result<usize, PortError> {
        if count == 0 {
            return Ok(0);
        }
        let mut discard = vec![0u8; count];
        self.device_mut()?.read_exact(&mut discard)?;
        Ok(count)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), PortError> {
        self.device_mut()?.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), PortError> {
        self.device_mut()?.flush()?;
        Ok(())
    }

    fn arm_notify(&mut self, on_data: DataNotify) -> Result<(), PortError> {
        self.disarm_notify();

        let peek = self.device()?.try_clone()?;
        let stop = Arc::new(AtomicBool::new(false));
        let thread = spawn_watcher(
            self.name.clone(),
            peek,
            self.poll_interval,
            Arc::clone(&stop),
            on_data,
        )?;

        self.watcher = Some(Watcher { stop, thread });
        Ok(())
    }

    fn disarm_notify(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.stop.store(true, Ordering::Release);
            if watcher.thread.join().is_err() {
                warn!(port = %self.name, "Data watcher thread panicked");
            }
        }
    }

    fn close(&mut self) {
        self.disarm_notify();
        if let Some(mut port) = self.port.take() {
            if let Err(e) = port.flush() {
                debug!(port = %self.name, "Flush on close failed: {}", e);
            }
        }
    }
}

fn spawn_watcher(
    name: String,
    peek: Box<dyn serialport::SerialPort>,
    interval: Duration,
    stop: Arc<AtomicBool>,
    on_data: DataNotify,
) -> Result<JoinHandle<()>, PortError> {
    let thread_name = format!("serial-watch:{name}");
    let handle = thread::Builder::new().name(thread_name).spawn(move || {
        while !stop.load(Ordering::Acquire) {
            match peek.bytes_to_read() {
                Ok(0) => {}
                Ok(_) => on_data(),
                Err(e) => {
                    // Let the listener hit the error on its next read.
                    warn!(port = %name, "Stopping data watcher: {}", e);
                    on_data();
                    break;
                }
            }
            thread::sleep(interval);
        }
    })?;
    Ok(handle)
}

impl Drop for SyncSerialPort {
    fn drop(&mut self) {
        self.disarm_notify();
    }
}

impl std::fmt::Debug for SyncSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSerialPort")
            .field("name", &self.name)
            .field("open", &self.port.is_some())
            .field("armed", &self.watcher.is_some())
            .finish()
    }
}

/// Transport over the ports the operating system reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTransport;

impl Transport for SystemTransport {
    fn list_port_identifiers(&self) -> Result<Vec<PortIdentifier>, PortError> {
        let ports = serialport::available_ports()?;
        Ok(ports
            .into_iter()
            .map(|p| {
                let description = match p.port_type {
                    serialport::SerialPortType::UsbPort(usb) => usb.product.or(usb.manufacturer),
                    serialport::SerialPortType::BluetoothPort => Some("Bluetooth".to_string()),
                    serialport::SerialPortType::PciPort => Some("PCI".to_string()),
                    serialport::SerialPortType::Unknown => None,
                };
                PortIdentifier {
                    name: p.port_name,
                    description,
                }
            })
            .collect())
    }

    fn open(
        &self,
        id: &PortIdentifier,
        config: &PortConfiguration,
    ) -> Result<Box<dyn ByteSink>, PortError> {
        Ok(Box::new(SyncSerialPort::open(&id.name, config)?))
    }
}
