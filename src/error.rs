use crate::port::PortError;
use thiserror::Error;

/// Result alias for port-level operations.
pub type SerialResult<T> = Result<T, SerialError>;

/// Errors surfaced to applications using a [`Port`](crate::Port).
///
/// Transport failures keep the underlying [`PortError`] as their source; open
/// failures only carry a message, so callers never depend on the transport's
/// own error types.
#[derive(Debug, Error)]
pub enum SerialError {
    #[error("Serial port '{path}' is unavailable: {reason}")]
    PortUnavailable { path: String, reason: String },

    #[error("Unsupported value kind for serial write: {kind}")]
    UnsupportedValueKind { kind: String },

    #[error("Read from '{path}' failed: {source}")]
    TransportReadFailure {
        path: String,
        #[source]
        source: PortError,
    },

    #[error("Write to '{path}' failed: {source}")]
    TransportWriteFailure {
        path: String,
        #[source]
        source: PortError,
    },

    #[error("A listener is already registered on '{path}'")]
    ListenerAlreadyRegistered { path: String },

    #[error("Port '{path}' is closed")]
    PortClosed { path: String },

    #[error("Frame size must be at least one byte")]
    InvalidFrameSize,

    #[error("Listener callback on '{path}' panicked: {message}")]
    CallbackPanicked { path: String, message: String },

    #[error("Chunk subscriber on '{path}' was dropped")]
    SubscriberDropped { path: String },
}

impl SerialError {
    pub fn port_unavailable(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PortUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported(kind: impl Into<String>) -> Self {
        Self::UnsupportedValueKind { kind: kind.into() }
    }

    pub fn read_failure(path: impl Into<String>, source: PortError) -> Self {
        Self::TransportReadFailure {
            path: path.into(),
            source,
        }
    }

    pub fn write_failure(path: impl Into<String>, source: PortError) -> Self {
        Self::TransportWriteFailure {
            path: path.into(),
            source,
        }
    }
}
