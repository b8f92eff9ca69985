//! Port lifecycle.
//!
//! A [`Port`] is one open serial session: it owns the sink, the listener
//! registry bound to it, and the outbound write path.
//!
//! ```text
//! Transport ──open──> ByteSink ──┐
//!                                ├──> Port ──write──> Encoder ──> ByteSink
//!           ListenerRegistry <───┘      └──listen──> Framer ──> callback
//! ```

use crate::encoder::{encode, OutboundValue};
use crate::error::{SerialError, SerialResult};
use crate::framer::{ByteFramer, ChunkFramer, Framer, SinkFramer};
use crate::listener::{ListenOptions, ListenerRegistry, ListenerState, Registration, SharedSink};
use crate::port::{ByteSink, PortConfiguration, PortError, SystemTransport, Transport};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Receiver side of [`Port::subscribe_chunks`].
pub type ChunkReceiver = mpsc::UnboundedReceiver<Vec<u8>>;

/// One open serial connection.
///
/// Dropping a `Port` closes it.
pub struct Port {
    path: String,
    config: PortConfiguration,
    sink: SharedSink,
    listeners: ListenerRegistry,
    closed: AtomicBool,
}

impl Port {
    /// Open `path` on the system transport with the default 2000 ms timeout, 8N1.
    ///
    /// # Example
    /// ```no_run
    /// use serial_events::{Port, DEFAULT_BAUD_RATE};
    ///
    /// let port = Port::open("/dev/ttyUSB0", DEFAULT_BAUD_RATE)?;
    /// port.on_byte(|b| println!("{b:#04x}"), true)?;
    /// port.write(vec![1u8, 2, 3])?;
    /// # Ok::<(), serial_events::SerialError>(())
    /// ```
    pub fn open(path: &str, baud_rate: u32) -> SerialResult<Self> {
        Self::open_with(&SystemTransport, path, PortConfiguration::with_baud(baud_rate))
    }

    /// Open `path` through `transport`.
    ///
    /// The first identifier named exactly `path` is used. Any failure is
    /// reported as [`SerialError::PortUnavailable`] naming `path`.
    pub fn open_with(
        transport: &dyn Transport,
        path: &str,
        config: PortConfiguration,
    ) -> SerialResult<Self> {
        let ids = transport
            .list_port_identifiers()
            .map_err(|e| SerialError::port_unavailable(path, format!("cannot list ports: {e}")))?;

        let id = ids
            .into_iter()
            .find(|id| id.name == path)
            .ok_or_else(|| SerialError::port_unavailable(path, "no matching port identifier"))?;

        let sink = transport
            .open(&id, &config)
            .map_err(|e| SerialError::port_unavailable(path, e.to_string()))?;

        info!(port = %path, baud_rate = config.baud_rate, "Opened serial port");
        Ok(Self::from_sink(sink, config))
    }

    /// Wrap an already open sink.
    pub fn from_sink(sink: Box<dyn ByteSink>, config: PortConfiguration) -> Self {
        let path = sink.name().to_string();
        let sink: SharedSink = Arc::new(Mutex::new(sink));
        Self {
            listeners: ListenerRegistry::new(path.clone(), Arc::clone(&sink)),
            path,
            config,
            sink,
            closed: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn baud_rate(&self) -> u32 {
        self.config.baud_rate
    }

    pub fn config(&self) -> &PortConfiguration {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> SerialResult<()> {
        if self.is_closed() {
            return Err(SerialError::PortClosed {
                path: self.path.clone(),
            });
        }
        Ok(())
    }

    /// Remove any listener, then release the sink. Closing twice is a no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.listeners.remove();
        self.sink.lock().close();
        info!(port = %self.path, "Closed serial port");
    }

    /// Encode `value`, write it and flush. Returns the number of bytes written.
    pub fn write(&self, value: impl Into<OutboundValue>) -> SerialResult<usize> {
        self.ensure_open()?;
        let bytes = encode(&value.into());

        let mut sink = self.sink.lock();
        let result: Result<(), PortError> = sink.write(&bytes).and_then(|()| sink.flush());
        result.map_err(|e| SerialError::write_failure(&self.path, e))?;

        debug!(port = %self.path, bytes = bytes.len(), "Wrote to serial port");
        Ok(bytes.len())
    }

    /// Write a JSON integer or array of integers.
    pub fn write_json(&self, value: &Value) -> SerialResult<usize> {
        let value = OutboundValue::try_from(value)?;
        self.write(value)
    }

    /// Bind `framer` with explicit options.
    pub fn register<F: Framer>(
        &self,
        framer: F,
        options: ListenOptions,
    ) -> SerialResult<Registration> {
        self.ensure_open()?;
        self.listeners.register(Box::new(framer), options)
    }

    /// Raw listener: `handler` receives the sink on every notification.
    ///
    /// The handler runs with the sink locked; it may use the sink it is given
    /// but must not call methods on this `Port`.
    pub fn listen<F>(&self, handler: F, skip_buffered: bool) -> SerialResult<Registration>
    where
        F: FnMut(&mut dyn ByteSink) -> Result<(), PortError> + Send + 'static,
    {
        self.register(
            SinkFramer::new(handler),
            ListenOptions::skip_buffered(skip_buffered),
        )
    }

    /// Deliver received bytes one at a time.
    pub fn on_byte<F>(&self, handler: F, skip_buffered: bool) -> SerialResult<Registration>
    where
        F: FnMut(u8) + Send + 'static,
    {
        self.register(
            ByteFramer::new(handler),
            ListenOptions::skip_buffered(skip_buffered),
        )
    }

    /// Deliver received bytes in chunks of exactly `n`.
    pub fn on_n_bytes<F>(&self, n: usize, handler: F, skip_buffered: bool) -> SerialResult<Registration>
    where
        F: FnMut(Vec<u8>) + Send + 'static,
    {
        self.register(
            ChunkFramer::new(n, handler)?,
            ListenOptions::skip_buffered(skip_buffered),
        )
    }

    /// Chunks of exactly `n` bytes, delivered through a channel for async consumers.
    ///
    /// The receiver yields `None` once the listener is removed, replaced or
    /// the port is closed. Dropping the receiver faults the listener with
    /// [`SerialError::SubscriberDropped`] on the next notification and leaves
    /// unread bytes in the port.
    pub fn subscribe_chunks(&self, n: usize, options: ListenOptions) -> SerialResult<ChunkReceiver> {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = tx.clone();
        let path = self.path.clone();
        let framer = ChunkFramer::new(n, move |chunk| {
            if tx.send(chunk).is_err() {
                warn!(port = %path, "Chunk subscriber dropped, discarding chunk");
            }
        })?
        .closed_when(move || sender.is_closed());
        self.register(framer, options)?;
        Ok(rx)
    }

    /// Disarm and clear the listener. Safe to call at any time, including after close.
    pub fn remove_listener(&self) -> bool {
        self.listeners.remove()
    }

    pub fn listener_state(&self) -> ListenerState {
        self.listeners.state()
    }

    /// Install the handler receiving asynchronous listener failures.
    ///
    /// Without one, failures are only logged.
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&SerialError) + Send + Sync + 'static,
    {
        self.listeners.set_error_handler(Arc::new(handler));
    }

    /// Block until every notification raised so far has been processed.
    ///
    /// # Panics
    ///
    /// Panics when called from within an async runtime context.
    pub fn settle(&self) {
        self.listeners.settle();
    }
}

impl Drop for Port {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Port")
            .field("path", &self.path)
            .field("baud_rate", &self.config.baud_rate)
            .field("closed", &self.is_closed())
            .field("listener", &self.listener_state())
            .finish()
    }
}
