//! Framing policies.
//!
//! A framer turns one data-available notification into zero or more
//! deliveries to the application. Work is split in two steps so that the
//! application callback never runs while the sink is locked:
//!
//! 1. [`Framer::read_units`] runs with the sink lock held and pulls complete
//!    units out of the sink into the framer's own queue.
//! 2. [`Framer::deliver`] runs after the lock is released and hands the
//!    queued units to the callback in the order they were read.
//!
//! Framers consume everything a notification makes usable, so frame
//! boundaries do not depend on how the driver batches its notifications.

use crate::error::{SerialError, SerialResult};
use crate::port::{ByteSink, PortError};
use std::collections::VecDeque;

/// A policy deciding when enough bytes have arrived to deliver a unit.
pub trait Framer: Send + 'static {
    /// Pull complete units out of `sink`. Called once per notification.
    fn read_units(&mut self, sink: &mut dyn ByteSink) -> Result<(), PortError>;

    /// Hand queued units to the application while `active` returns true.
    ///
    /// `active` is checked before every unit. Once it returns false the
    /// remaining queue is dropped.
    fn deliver(&mut self, active: &dyn Fn() -> bool);

    /// Whether the application has stopped accepting units.
    ///
    /// A closed framer is never read again, so pending bytes stay in the sink.
    fn is_closed(&self) -> bool {
        false
    }
}

fn drain<T>(ready: &mut VecDeque<T>, active: &dyn Fn() -> bool, mut handler: impl FnMut(T)) {
    while let Some(unit) = ready.pop_front() {
        if !active() {
            ready.clear();
            return;
        }
        handler(unit);
    }
}

/// Raw listener: the handler gets the sink itself on every notification.
///
/// The handler runs with the sink lock held. It may read and write the sink
/// it is given but must not call back into the owning `Port`.
pub struct SinkFramer<F> {
    handler: F,
}

impl<F> SinkFramer<F>
where
    F: FnMut(&mut dyn ByteSink) -> Result<(), PortError> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F> Framer for SinkFramer<F>
where
    F: FnMut(&mut dyn ByteSink) -> Result<(), PortError> + Send + 'static,
{
    fn read_units(&mut self, sink: &mut dyn ByteSink) -> Result<(), PortError> {
        (self.handler)(sink)
    }

    fn deliver(&mut self, _active: &dyn Fn() -> bool) {}
}

/// Delivers every received byte individually.
pub struct ByteFramer<F> {
    handler: F,
    ready: VecDeque<u8>,
}

impl<F> ByteFramer<F>
where
    F: FnMut(u8) + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            ready: VecDeque::new(),
        }
    }
}

impl<F> Framer for ByteFramer<F>
where
    F: FnMut(u8) + Send + 'static,
{
    fn read_units(&mut self, sink: &mut dyn ByteSink) -> Result<(), PortError> {
        let count = sink.available()?;
        for _ in 0..count {
            self.ready.push_back(sink.read_byte()?);
        }
        Ok(())
    }

    fn deliver(&mut self, active: &dyn Fn() -> bool) {
        drain(&mut self.ready, active, &mut self.handler);
    }
}

/// Delivers fixed-size chunks of exactly `size` bytes.
///
/// Nothing is read while fewer than `size` bytes are buffered; those bytes
/// stay in the sink until a later notification finds enough of them.
pub struct ChunkFramer<F> {
    size: usize,
    handler: F,
    ready: VecDeque<Vec<u8>>,
    closed: Option<Box<dyn Fn() -> bool + Send>>,
}

impl<F> ChunkFramer<F>
where
    F: FnMut(Vec<u8>) + Send + 'static,
{
    pub fn new(size: usize, handler: F) -> SerialResult<Self> {
        if size == 0 {
            return Err(SerialError::InvalidFrameSize);
        }
        Ok(Self {
            size,
            handler,
            ready: VecDeque::new(),
            closed: None,
        })
    }

    /// Stop reading once `closed` returns true, e.g. when a channel receiver is gone.
    pub fn closed_when(mut self, closed: impl Fn() -> bool + Send + 'static) -> Self {
        self.closed = Some(Box::new(closed));
        self
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl<F> Framer for ChunkFramer<F>
where
    F: FnMut(Vec<u8>) + Send + 'static,
{
    fn read_units(&mut self, sink: &mut dyn ByteSink) -> Result<(), PortError> {
        let mut available = sink.available()?;
        while available >= self.size {
            let mut chunk = Vec::with_capacity(self.size);
            for _ in 0..self.size {
                chunk.push(sink.read_byte()?);
            }
            self.ready.push_back(chunk);
            available -= self.size;
        }
        Ok(())
    }

    fn deliver(&mut self, active: &dyn Fn() -> bool) {
        drain(&mut self.ready, active, &mut self.handler);
    }

    fn is_closed(&self) -> bool {
        self.closed.as_ref().is_some_and(|closed| closed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::MockSerialPort;
    use std::sync::{Arc, Mutex};

    fn recorder<T: Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl FnMut(T) + Send + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |unit| sink.lock().unwrap().push(unit))
    }

    #[test]
    fn test_byte_framer_drains_everything_available() {
        let mut port = MockSerialPort::new("MOCK0");
        port.enqueue_read(&[1, 2, 3]);
        let (seen, handler) = recorder();
        let mut framer = ByteFramer::new(handler);

        framer.read_units(&mut port).unwrap();
        assert!(seen.lock().unwrap().is_empty(), "delivery waits for deliver()");
        framer.deliver(&|| true);

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(port.available_bytes(), 0);
    }

    #[test]
    fn test_byte_framer_spurious_firing_reads_nothing() {
        let mut port = MockSerialPort::new("MOCK0");
        let (seen, handler) = recorder::<u8>();
        let mut framer = ByteFramer::new(handler);

        framer.read_units(&mut port).unwrap();
        framer.deliver(&|| true);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_chunk_framer_leaves_short_input_in_sink() {
        let mut port = MockSerialPort::new("MOCK0");
        port.enqueue_read(&[1, 2, 3]);
        let (seen, handler) = recorder::<Vec<u8>>();
        let mut framer = ChunkFramer::new(4, handler).unwrap();

        framer.read_units(&mut port).unwrap();
        framer.deliver(&|| true);

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(port.available_bytes(), 3);
    }

    #[test]
    fn test_chunk_framer_keeps_remainder_for_next_firing() {
        let mut port = MockSerialPort::new("MOCK0");
        port.enqueue_read(&[1, 2, 3, 4, 5, 6, 7]);
        let (seen, handler) = recorder::<Vec<u8>>();
        let mut framer = ChunkFramer::new(3, handler).unwrap();

        framer.read_units(&mut port).unwrap();
        framer.deliver(&|| true);
        assert_eq!(*seen.lock().unwrap(), vec![vec![1, 2, 3], vec![4, 5, 6]]);
        assert_eq!(port.available_bytes(), 1);

        port.enqueue_read(&[8, 9]);
        framer.read_units(&mut port).unwrap();
        framer.deliver(&|| true);
        assert_eq!(seen.lock().unwrap().last(), Some(&vec![7, 8, 9]));
    }

    #[test]
    fn test_deliver_drops_queue_once_inactive() {
        let mut port = MockSerialPort::new("MOCK0");
        port.enqueue_read(&[1, 2, 3]);
        let (seen, handler) = recorder::<u8>();
        let mut framer = ByteFramer::new(handler);
        framer.read_units(&mut port).unwrap();

        let calls = std::sync::atomic::AtomicUsize::new(0);
        framer.deliver(&|| calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) < 1);
        assert_eq!(*seen.lock().unwrap(), vec![1]);

        // Nothing from the dropped queue resurfaces
        framer.deliver(&|| true);
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_chunk_framer_closed_when() {
        let open = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let flag = Arc::clone(&open);
        let framer = ChunkFramer::new(2, |_chunk: Vec<u8>| {})
            .unwrap()
            .closed_when(move || !flag.load(std::sync::atomic::Ordering::SeqCst));

        assert!(!framer.is_closed());
        open.store(false, std::sync::atomic::Ordering::SeqCst);
        assert!(framer.is_closed());
        assert!(!ByteFramer::new(|_| {}).is_closed());
    }

    #[test]
    fn test_chunk_framer_rejects_zero_size() {
        let result = ChunkFramer::new(0, |_chunk: Vec<u8>| {});
        assert!(matches!(result, Err(SerialError::InvalidFrameSize)));
    }

    #[test]
    fn test_read_error_propagates() {
        let mut port = MockSerialPort::new("MOCK0");
        port.enqueue_read(&[1, 2]);
        port.set_should_timeout(true);
        let (_seen, handler) = recorder::<Vec<u8>>();
        let mut framer = ChunkFramer::new(2, handler).unwrap();

        let err = framer.read_units(&mut port).unwrap_err();
        assert!(matches!(err, PortError::Timeout(_)));
    }

    #[test]
    fn test_sink_framer_gets_the_sink() {
        let mut port = MockSerialPort::new("MOCK0");
        port.enqueue_read(b"ping");
        let mut framer = SinkFramer::new(|sink: &mut dyn ByteSink| {
            let n = sink.available()?;
            sink.skip(n)?;
            sink.write(b"pong")
        });

        framer.read_units(&mut port).unwrap();
        assert_eq!(port.available_bytes(), 0);
        assert_eq!(port.written_bytes(), b"pong".to_vec());
    }
}
