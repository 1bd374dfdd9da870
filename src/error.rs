//! Error types for FastAGI operations.
//!
//! All fallible operations in this crate return [`AgiResult<T>`].  Errors are
//! classified into two axes for caller convenience:
//!
//! - **Channel errors** ([`AgiError::is_channel_error`]) — the call's TCP
//!   session is dead and no further commands can succeed.
//! - **Recoverable errors** ([`AgiError::is_recoverable`]) — the command
//!   failed but the channel is still usable (e.g., timeout, verb rejected,
//!   queue full).

use std::fmt;
use thiserror::Error;

/// Result type alias for AGI operations
pub type AgiResult<T> = Result<T, AgiError>;

/// Why a channel was terminated.
///
/// Carried by [`AgiError::ChannelDead`] and by the `QueueCleared` event so
/// that every rejected submitter can tell a remote hangup from a local
/// close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateReason {
    /// The socket closed or a transport error ended the session
    ChannelClosed,
    /// Asterisk sent a `HANGUP` line
    Hangup,
    /// The queue was drained by an explicit local clear
    Manual,
}

impl fmt::Display for TerminateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminateReason::ChannelClosed => write!(f, "channel_closed"),
            TerminateReason::Hangup => write!(f, "hangup"),
            TerminateReason::Manual => write!(f, "manual"),
        }
    }
}

/// Comprehensive error types for AGI operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AgiError {
    /// IO error from underlying TCP operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection closed by Asterisk before the session completed
    #[error("Connection closed by Asterisk")]
    ConnectionClosed,

    /// Protocol error - malformed header block or response line
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Inbound data accumulated without ever forming a complete record
    #[error("Buffer overflow: {size} bytes accumulated exceeds limit {limit}")]
    BufferOverflow { size: usize, limit: usize },

    /// A verb's response code/result indicated failure
    #[error("{message} (command: {command})")]
    CommandFailed { command: String, message: String },

    /// The per-command timer elapsed before Asterisk replied
    #[error("Command timeout after {timeout_ms}ms: {command}")]
    Timeout { command: String, timeout_ms: u64 },

    /// The command queue was at capacity at submit time
    #[error("Command queue full, rejecting: {command}")]
    QueueFull { command: String },

    /// The channel died while the command was pending or in flight
    #[error("Channel terminated ({reason}): {command}")]
    ChannelDead {
        reason: TerminateReason,
        command: String,
    },

    /// The command was rejected because the queue was manually cleared
    #[error("Command queue manually cleared: {command}")]
    Cleared { command: String },

    /// `DIALSTATUS` held a value outside the known enumeration
    #[error("Unknown DIALSTATUS value: {status}")]
    UnknownDialStatus { status: String },

    /// `CPLAYBACKSTATUS` held a value outside the known enumeration
    #[error("Unknown playback status: {status}")]
    UnknownPlaybackStatus { status: String },

    /// `CHANNEL STATUS` returned a code outside the known enumeration
    #[error("Unknown channel status code: {code}")]
    UnknownChannelStatus { code: i64 },
}

impl AgiError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn command_failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }

    /// `true` if the channel is still usable and further commands may
    /// succeed.
    ///
    /// Recoverable: `CommandFailed`, `Timeout`, `QueueFull`, `Cleared` and
    /// the unknown-enumeration rejections. Non-recoverable errors (I/O,
    /// protocol, dead channel) mean the session is over.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AgiError::CommandFailed { .. }
                | AgiError::Timeout { .. }
                | AgiError::QueueFull { .. }
                | AgiError::Cleared { .. }
                | AgiError::UnknownDialStatus { .. }
                | AgiError::UnknownPlaybackStatus { .. }
                | AgiError::UnknownChannelStatus { .. }
        )
    }

    /// `true` if the call's TCP session is dead.
    ///
    /// Matches: `Io`, `ConnectionClosed`, `ChannelDead`, `Protocol`,
    /// `BufferOverflow`.
    pub fn is_channel_error(&self) -> bool {
        matches!(
            self,
            AgiError::Io(_)
                | AgiError::ConnectionClosed
                | AgiError::ChannelDead { .. }
                | AgiError::Protocol { .. }
                | AgiError::BufferOverflow { .. }
        )
    }
}
