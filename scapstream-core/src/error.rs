//! Error types for frame transport.
//!
//! Every fallible operation in the crate returns `Result<T, ScapError>`.
//! Whether an error ends the receive loop depends on the transport: see
//! [`ScapError::is_recoverable`].

use std::time::Duration;

use thiserror::Error;

use crate::config::TransportKind;

/// The canonical error type for scapstream.
#[derive(Debug, Error)]
pub enum ScapError {
    // ── Framing Errors ───────────────────────────────────────────
    /// The peer closed the stream before a read could be satisfied.
    #[error("connection lost: expected {expected} bytes, got {received}")]
    ConnectionLost { expected: usize, received: usize },

    /// Frame metadata declared a size or chunk count beyond the sanity ceilings.
    #[error("malformed metadata: total_size={total_size}, chunk_count={chunk_count}")]
    MalformedMetadata { total_size: u32, chunk_count: u32 },

    /// The chunks of a frame did not add up to its declared size.
    #[error("incomplete frame: expected {expected} bytes, got {actual}")]
    IncompleteFrame { expected: usize, actual: usize },

    /// A datagram frame did not complete before its deadline.
    #[error("frame timed out after {0:?}")]
    Timeout(Duration),

    // ── Transport Errors ─────────────────────────────────────────
    /// Binding or listening on the configured address failed.
    #[error("transport setup failed on {addr}: {source}")]
    TransportSetup {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The socket layer reported an error.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// A channel to or from the receiver task was closed.
    #[error("channel closed")]
    ChannelClosed,

    // ── Lifecycle Errors ─────────────────────────────────────────
    /// An invalid receiver phase transition was attempted.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// The receiver task panicked or was aborted.
    #[error("receiver task failed: {0}")]
    TaskFailed(String),

    /// The transport configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ScapError {
    /// Whether the receive loop may continue after this error on `transport`.
    ///
    /// Datagram frames are independent, self-describing units, so a bad or
    /// lost frame only costs that frame. A byte stream has no frame-boundary
    /// markers, so any framing error there leaves the reader desynchronized.
    pub fn is_recoverable(&self, transport: TransportKind) -> bool {
        match self {
            Self::MalformedMetadata { .. } | Self::IncompleteFrame { .. } | Self::Timeout(_) => {
                transport == TransportKind::Datagram
            }
            _ => false,
        }
    }

    pub(crate) fn setup(addr: impl Into<String>, source: std::io::Error) -> Self {
        Self::TransportSetup {
            addr: addr.into(),
            source,
        }
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for ScapError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        ScapError::ChannelClosed
    }
}

impl From<tokio::task::JoinError> for ScapError {
    fn from(e: tokio::task::JoinError) -> Self {
        ScapError::TaskFailed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = ScapError::ConnectionLost {
            expected: 8,
            received: 3,
        };
        assert!(e.to_string().contains('8'));
        assert!(e.to_string().contains('3'));

        let e = ScapError::MalformedMetadata {
            total_size: 99,
            chunk_count: 5000,
        };
        assert!(e.to_string().contains("5000"));
    }

    #[test]
    fn recoverability_depends_on_transport() {
        let e = ScapError::IncompleteFrame {
            expected: 12,
            actual: 8,
        };
        assert!(e.is_recoverable(TransportKind::Datagram));
        assert!(!e.is_recoverable(TransportKind::Stream));

        let e = ScapError::ConnectionLost {
            expected: 4,
            received: 0,
        };
        assert!(!e.is_recoverable(TransportKind::Datagram));
        assert!(!e.is_recoverable(TransportKind::Stream));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: ScapError = io_err.into();
        assert!(matches!(e, ScapError::Io(_)));
    }
}
