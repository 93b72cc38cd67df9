//! Receiver lifecycle state machine.
//!
//! Provides a `ReceiverPhase` enum with validated transitions that return
//! `Result` instead of panicking.

use std::net::SocketAddr;
use std::time::Instant;

use crate::error::ScapError;

/// The current phase of a receiver.
///
/// ```text
///  Idle ──► Listening ──► Connected ──► Receiving ──► Stopping ──► Stopped
///               │                          ▲   │                      ▲
///               └──── (datagram) ──────────┘   └──── (fatal error) ───┘
/// ```
///
/// Every non-terminal phase may also move to `Stopping` on an external stop
/// request. `Stopped` is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReceiverPhase {
    /// Constructed, nothing bound yet.
    #[default]
    Idle,

    /// Socket bound; waiting for a peer (stream) or for datagrams.
    Listening { local_addr: SocketAddr },

    /// Stream peer accepted.
    Connected { peer: SocketAddr },

    /// Decoding frames.
    Receiving {
        /// When the receiver entered the `Receiving` state.
        since: Instant,
    },

    /// Teardown requested; sockets are being closed.
    Stopping,

    /// Terminal.
    Stopped,
}

impl std::fmt::Display for ReceiverPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Listening { .. } => write!(f, "Listening"),
            Self::Connected { .. } => write!(f, "Connected"),
            Self::Receiving { .. } => write!(f, "Receiving"),
            Self::Stopping => write!(f, "Stopping"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

impl ReceiverPhase {
    pub fn is_receiving(&self) -> bool {
        matches!(self, Self::Receiving { .. })
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Listening`.
    ///
    /// Valid from: `Idle`.
    pub fn begin_listen(&mut self, local_addr: SocketAddr) -> Result<(), ScapError> {
        match self {
            Self::Idle => {
                *self = Self::Listening { local_addr };
                Ok(())
            }
            _ => Err(ScapError::ProtocolViolation(
                "cannot listen: not in Idle state",
            )),
        }
    }

    /// Transition to `Connected`.
    ///
    /// Valid from: `Listening`.
    pub fn accept(&mut self, peer: SocketAddr) -> Result<(), ScapError> {
        match self {
            Self::Listening { .. } => {
                *self = Self::Connected { peer };
                Ok(())
            }
            _ => Err(ScapError::ProtocolViolation(
                "cannot accept: not in Listening state",
            )),
        }
    }

    /// Transition to `Receiving`.
    ///
    /// Valid from: `Connected` (stream), `Listening` (datagram).
    pub fn begin_receive(&mut self) -> Result<(), ScapError> {
        match self {
            Self::Connected { .. } | Self::Listening { .. } => {
                *self = Self::Receiving {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(ScapError::ProtocolViolation(
                "cannot receive: not in Connected or Listening state",
            )),
        }
    }

    /// Transition to `Stopping`.
    ///
    /// Valid from any phase except `Stopping` and `Stopped`.
    pub fn begin_stop(&mut self) -> Result<(), ScapError> {
        match self {
            Self::Stopping | Self::Stopped => Err(ScapError::ProtocolViolation(
                "cannot stop: already stopping",
            )),
            _ => {
                *self = Self::Stopping;
                Ok(())
            }
        }
    }

    /// Move to the terminal `Stopped` phase from anywhere.
    ///
    /// Used both after `Stopping` and on fatal errors.
    pub fn finish_stop(&mut self) {
        *self = Self::Stopped;
    }
}

// ── Tests ────────────────────────────────────────────────────────
