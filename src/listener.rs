//! Listener registry.
//!
//! Binds at most one [`Framer`] to a port's sink. Each binding owns a worker
//! thread fed by a channel: the sink's data-available callback only flags
//! and enqueues a notification, and the worker runs the framer against the
//! sink, one notification at a time. A read failure or a panicking callback
//! faults the binding instead of being dropped.

use crate::error::{SerialError, SerialResult};
use crate::framer::Framer;
use crate::port::{ByteSink, DataNotify, PortError};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

/// The sink shared between a port's writer and its listener worker.
pub type SharedSink = Arc<Mutex<Box<dyn ByteSink>>>;

/// Callback receiving failures that happen on the listener worker.
pub type ErrorHandler = Arc<dyn Fn(&SerialError) + Send + Sync>;

/// What to do when a listener is already bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnConflict {
    /// Fail with [`SerialError::ListenerAlreadyRegistered`].
    #[default]
    Reject,
    /// Stop the bound listener and take its place.
    Replace,
}

/// Options for binding a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenOptions {
    /// Discard bytes already buffered when the listener is bound.
    pub skip_buffered: bool,
    pub on_conflict: OnConflict,
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self {
            skip_buffered: true,
            on_conflict: OnConflict::Reject,
        }
    }
}

impl ListenOptions {
    pub fn skip_buffered(skip_buffered: bool) -> Self {
        Self {
            skip_buffered,
            ..Self::default()
        }
    }

    /// Same options, replacing any bound listener.
    pub fn replacing(mut self) -> Self {
        self.on_conflict = OnConflict::Replace;
        self
    }
}

/// Outcome of a successful registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// No live listener was bound before.
    Registered,
    /// A live listener was stopped and replaced.
    Replaced,
}

/// Observable state of a port's listener slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerState {
    Unregistered,
    Armed,
    /// The worker stopped after a failure; the binding stays until removed or replaced.
    Faulted { reason: String },
}

enum WorkerEvent {
    DataAvailable,
    Settle(oneshot::Sender<()>),
    Shutdown,
}

struct ListenerHandle {
    events: mpsc::UnboundedSender<WorkerEvent>,
    stopped: Arc<AtomicBool>,
    fault: Arc<Mutex<Option<String>>>,
    worker: JoinHandle<()>,
}

impl ListenerHandle {
    fn is_faulted(&self) -> bool {
        self.fault.lock().is_some()
    }

    /// Stop the worker. Returns the thread for joining once no locks are held.
    fn stop(self) -> JoinHandle<()> {
        self.stopped.store(true, Ordering::SeqCst);
        let _ = self.events.send(WorkerEvent::Shutdown);
        self.worker
    }
}

fn join_worker(worker: JoinHandle<()>) {
    // A callback may remove its own listener; that thread cannot join itself.
    if worker.thread().id() == thread::current().id() {
        return;
    }
    if worker.join().is_err() {
        warn!("Listener worker exited with a panic");
    }
}

/// Per-port listener slot.
pub struct ListenerRegistry {
    path: String,
    sink: SharedSink,
    slot: Mutex<Option<ListenerHandle>>,
    error_handler: Arc<Mutex<Option<ErrorHandler>>>,
}

impl ListenerRegistry {
    pub fn new(path: impl Into<String>, sink: SharedSink) -> Self {
        Self {
            path: path.into(),
            sink,
            slot: Mutex::new(None),
            error_handler: Arc::new(Mutex::new(None)),
        }
    }

    /// Install the handler that receives listener failures.
    pub fn set_error_handler(&self, handler: ErrorHandler) {
        *self.error_handler.lock() = Some(handler);
    }

    /// Bind `framer` to the sink.
    ///
    /// With `skip_buffered`, the bytes reported available right now are
    /// discarded first. Bytes arriving after that are delivered. Once armed,
    /// one notification is raised immediately so a kept backlog is processed
    /// without waiting for new data.
    ///
    /// A replaced listener is stopped before the sink is touched. If arming
    /// then fails, the slot is left unregistered.
    pub fn register(
        &self,
        framer: Box<dyn Framer>,
        options: ListenOptions,
    ) -> SerialResult<Registration> {
        let mut slot = self.slot.lock();

        let mut replaced = false;
        let mut previous_worker = None;
        if let Some(current) = slot.take() {
            let live = !current.is_faulted();
            if live && options.on_conflict == OnConflict::Reject {
                *slot = Some(current);
                return Err(SerialError::ListenerAlreadyRegistered {
                    path: self.path.clone(),
                });
            }
            replaced = live;
            previous_worker = Some(current.stop());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicBool::new(false));
        let stopped = Arc::new(AtomicBool::new(false));
        let fault = Arc::new(Mutex::new(None));

        let notify: DataNotify = {
            let tx = tx.clone();
            let pending = Arc::clone(&pending);
            Arc::new(move || {
                if !pending.swap(true, Ordering::SeqCst) {
                    let _ = tx.send(WorkerEvent::DataAvailable);
                }
            })
        };

        if let Err(e) = self.arm(Arc::clone(&notify), options.skip_buffered) {
            drop(slot);
            if let Some(previous) = previous_worker {
                join_worker(previous);
            }
            return Err(SerialError::read_failure(&self.path, e));
        }

        let worker = Worker {
            path: self.path.clone(),
            sink: Arc::clone(&self.sink),
            framer,
            pending,
            stopped: Arc::clone(&stopped),
            fault: Arc::clone(&fault),
            error_handler: Arc::clone(&self.error_handler),
        };
        let spawned = thread::Builder::new()
            .name(format!("serial-listener:{}", self.path))
            .spawn(move || worker.run(rx));
        let worker = match spawned {
            Ok(worker) => worker,
            Err(e) => {
                self.sink.lock().disarm_notify();
                drop(slot);
                if let Some(previous) = previous_worker {
                    join_worker(previous);
                }
                return Err(SerialError::read_failure(&self.path, e.into()));
            }
        };

        *slot = Some(ListenerHandle {
            events: tx,
            stopped,
            fault,
            worker,
        });
        drop(slot);

        if let Some(previous) = previous_worker {
            join_worker(previous);
        }
        notify();

        debug!(port = %self.path, replaced, skip_buffered = options.skip_buffered, "Listener armed");
        Ok(if replaced {
            Registration::Replaced
        } else {
            Registration::Registered
        })
    }

    /// Skip the backlog if asked, then point the sink's notification at `notify`.
    fn arm(&self, notify: DataNotify, skip_buffered: bool) -> Result<(), PortError> {
        let mut sink = self.sink.lock();
        sink.disarm_notify();
        if skip_buffered {
            let backlog = sink.available()?;
            let skipped = sink.skip(backlog)?;
            debug!(port = %self.path, skipped, "Discarded buffered bytes");
        }
        sink.arm_notify(notify)
    }

    /// Disarm and clear the binding. Returns whether one was bound.
    pub fn remove(&self) -> bool {
        let Some(handle) = self.slot.lock().take() else {
            return false;
        };
        let worker = handle.stop();
        self.sink.lock().disarm_notify();
        join_worker(worker);
        debug!(port = %self.path, "Listener removed");
        true
    }

    pub fn state(&self) -> ListenerState {
        match self.slot.lock().as_ref() {
            None => ListenerState::Unregistered,
            Some(handle) => match handle.fault.lock().clone() {
                Some(reason) => ListenerState::Faulted { reason },
                None => ListenerState::Armed,
            },
        }
    }

    /// Block until every notification raised before this call is processed.
    ///
    /// Returns immediately when no live listener is bound, or when called
    /// from a listener callback, which runs on the worker itself.
    ///
    /// # Panics
    ///
    /// Panics when called from within an async runtime context.
    pub fn settle(&self) {
        let (ack, done) = oneshot::channel();
        {
            let slot = self.slot.lock();
            let Some(handle) = slot.as_ref() else {
                return;
            };
            if handle.worker.thread().id() == thread::current().id() {
                return;
            }
            if handle.events.send(WorkerEvent::Settle(ack)).is_err() {
                return;
            }
        }
        // An error means the worker stopped first; nothing is left to wait for.
        let _ = done.blocking_recv();
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("path", &self.path)
            .field("state", &self.state())
            .finish()
    }
}

struct Worker {
    path: String,
    sink: SharedSink,
    framer: Box<dyn Framer>,
    pending: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    fault: Arc<Mutex<Option<String>>>,
    error_handler: Arc<Mutex<Option<ErrorHandler>>>,
}

impl Worker {
    fn run(mut self, mut events: mpsc::UnboundedReceiver<WorkerEvent>) {
        while let Some(event) = events.blocking_recv() {
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }
            match event {
                WorkerEvent::DataAvailable => {
                    if let Err(err) = self.on_data() {
                        self.fail(err);
                        break;
                    }
                }
                WorkerEvent::Settle(ack) => {
                    let _ = ack.send(());
                }
                WorkerEvent::Shutdown => break,
            }
        }
        debug!(port = %self.path, "Listener worker exiting");
    }

    /// One notification: read under the sink lock, then deliver without it.
    fn on_data(&mut self) -> SerialResult<()> {
        self.pending.store(false, Ordering::SeqCst);
        if self.framer.is_closed() {
            return Err(SerialError::SubscriberDropped {
                path: self.path.clone(),
            });
        }

        let framer = &mut self.framer;
        let sink = &self.sink;
        let read = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut guard = sink.lock();
            framer.read_units(&mut **guard)
        }));

        // Units read before a failure are still handed over, unless a
        // callback removed the listener or closed the port meanwhile.
        let stopped = &self.stopped;
        let active = || !stopped.load(Ordering::SeqCst);
        let delivered = panic::catch_unwind(AssertUnwindSafe(|| self.framer.deliver(&active)));

        match read {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(SerialError::read_failure(&self.path, e)),
            Err(payload) => return Err(self.panicked(payload)),
        }
        delivered.map_err(|payload| self.panicked(payload))
    }

    fn panicked(&self, payload: Box<dyn Any + Send>) -> SerialError {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        SerialError::CallbackPanicked {
            path: self.path.clone(),
            message,
        }
    }

    fn fail(&self, err: SerialError) {
        error!(port = %self.path, "Listener faulted: {}", err);
        *self.fault.lock() = Some(err.to_string());
        {
            // A replacement sets `stopped` before touching the sink; its notification must survive.
            let mut sink = self.sink.lock();
            if !self.stopped.load(Ordering::SeqCst) {
                sink.disarm_notify();
            }
        }

        let handler = self.error_handler.lock().clone();
        if let Some(handler) = handler {
            handler(&err);
        }
    }
}
