//! Encoder connection state machine.
//!
//! `ConnectionState` models the lifecycle of the single SmartGen socket,
//! with validated transitions that return `Result` instead of panicking.
//! It is owned by the connection task and published read-only to
//! observers.

use std::time::Instant;

use crate::error::RdsError;

// ── ConnectionState ──────────────────────────────────────────────

/// The current state of the encoder connection.
///
/// ```text
///  Disconnected ──► Connecting ──► Connected
///       ▲             │  ▲  │           │
///       │             │  └──┘ retry     │
///       │             ▼                 │
///       │          Faulted              │
///       └───────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No socket. Initial state, and where a lost connection lands.
    #[default]
    Disconnected,

    /// Dialing, possibly between backoff retries.
    Connecting,

    /// Socket is up; commands may be sent.
    Connected {
        /// When the connection entered the `Connected` state.
        since: Instant,
    },

    /// Setup is invalid; no further attempts are made.
    Faulted { reason: String },
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected { .. } => write!(f, "Connected"),
            Self::Faulted { reason } => write!(f, "Faulted ({reason})"),
        }
    }
}

impl ConnectionState {
    /// Returns `true` when commands can be sent.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self, Self::Faulted { .. })
    }

    /// How long the connection has been up.
    ///
    /// Returns `None` for any other state.
    pub fn connected_duration(&self) -> Option<std::time::Duration> {
        match self {
            Self::Connected { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Connecting`.
    ///
    /// Valid from: `Disconnected`, `Connecting` (retry).
    pub fn begin_connect(&mut self) -> Result<(), RdsError> {
        match self {
            Self::Disconnected | Self::Connecting => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(RdsError::ProtocolViolation(
                "cannot connect: not in Disconnected or Connecting state",
            )),
        }
    }

    /// Transition to `Connected`.
    ///
    /// Valid from: `Connecting`.
    pub fn complete_connect(&mut self) -> Result<(), RdsError> {
        match self {
            Self::Connecting => {
                *self = Self::Connected {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(RdsError::ProtocolViolation(
                "cannot complete connect: not in Connecting state",
            )),
        }
    }

    /// Transition to `Disconnected` after a timeout or socket error.
    ///
    /// Valid from: `Connected`.
    pub fn connection_lost(&mut self) -> Result<(), RdsError> {
        match self {
            Self::Connected { .. } => {
                *self = Self::Disconnected;
                Ok(())
            }
            _ => Err(RdsError::ProtocolViolation(
                "cannot lose connection: not in Connected state",
            )),
        }
    }

    /// Transition to `Faulted`.
    ///
    /// Valid from: `Disconnected`, `Connecting`.
    pub fn fault(&mut self, reason: impl Into<String>) -> Result<(), RdsError> {
        match self {
            Self::Disconnected | Self::Connecting => {
                *self = Self::Faulted {
                    reason: reason.into(),
                };
                Ok(())
            }
            _ => Err(RdsError::ProtocolViolation(
                "cannot fault: connection is live or already faulted",
            )),
        }
    }

    /// Force-reset to `Disconnected` regardless of current state.
    ///
    /// Used on shutdown.
    pub fn force_disconnect(&mut self) {
        *self = Self::Disconnected;
    }
}

// ── Tests ────────────────────────────────────────────────────────
