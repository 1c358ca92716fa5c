//! Domain-specific error types for the RDS encoder bridge.
//!
//! Fallible operations return `Result<T, RdsError>`. Per-command outcomes of
//! a submission use [`CommandError`], which is `Clone` so a single connection
//! failure can be reported against every abandoned command.

use thiserror::Error;

use crate::command::Verb;

/// The canonical error type for the crate.
#[derive(Debug, Error)]
pub enum RdsError {
    // ── Formatting Errors ────────────────────────────────────────
    /// A command value failed wire-syntax validation and was not sent.
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    // ── Command Errors ───────────────────────────────────────────
    /// A submitted command did not complete.
    #[error(transparent)]
    Command(#[from] CommandError),

    // ── Protocol Errors ──────────────────────────────────────────
    /// A response line exceeded the codec limit.
    #[error("response line too long: {size} bytes (max {max})")]
    LineTooLong { size: usize, max: usize },

    /// A state transition or payload violated protocol rules.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// An RT+TAG value could not be decoded.
    #[error("invalid RT+ payload: {0}")]
    InvalidRtPlus(String),

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    // ── Configuration Errors ─────────────────────────────────────
    /// Setup is invalid and retrying will not help.
    #[error("configuration fault: {0}")]
    ConfigFault(String),

    // ── Serialization Errors ─────────────────────────────────────
    /// A track event payload could not be parsed.
    #[error("invalid track payload: {0}")]
    InvalidPayload(String),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

// ── FormatError ──────────────────────────────────────────────────

/// Wire-syntax violations detected by the command formatter.
///
/// Any of these means the value must not be transmitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// The value is longer than the verb allows.
    #[error("{verb} value too long: {len} chars (max {max})")]
    TooLong { verb: Verb, len: usize, max: usize },

    /// The value contains a byte outside printable 7-bit ASCII.
    #[error("{verb} value has non-printable byte {byte:#04x} at {index}")]
    NonPrintable { verb: Verb, byte: u8, index: usize },

    /// The value contains a line terminator byte.
    #[error("{verb} value contains a line terminator")]
    ContainsTerminator { verb: Verb },

    /// The value does not follow the verb's field syntax.
    #[error("{verb} value is malformed: {reason}")]
    Malformed { verb: Verb, reason: &'static str },
}

// ── CommandError ─────────────────────────────────────────────────

/// Why a single command of a submission did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The encoder answered `NO`. The connection stays up.
    #[error("command {command} rejected by encoder")]
    Rejected { command: String },

    /// The socket failed or timed out; the rest of the submission was
    /// abandoned and the client is reconnecting.
    #[error("connection lost: {reason}")]
    ConnectionLost { reason: String },

    /// No connection was available when the command came up.
    #[error("encoder not connected")]
    NotConnected,

    /// A newer submission replaced this one before the command was sent.
    #[error("superseded by a newer submission")]
    Superseded,

    /// The client is faulted and needs operator intervention.
    #[error("client faulted: {0}")]
    Faulted(String),

    /// The client shut down before the command was sent.
    #[error("client shut down")]
    Shutdown,
}

impl CommandError {
    /// `true` for failures that mean the link to the encoder is gone.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            CommandError::ConnectionLost { .. } | CommandError::NotConnected
        )
    }
}
