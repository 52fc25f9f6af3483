//! Error types for device sessions.

use thiserror::Error;

/// Errors surfaced by a [`Session`](crate::session::Session).
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SessionError {
    /// Raised when the transport process cannot be started.
    #[error("failed to start {program}: {message}")]
    Spawn {
        /// Program that failed to launch.
        program: String,
        /// Underlying error message.
        message: String,
    },
    /// Raised when a command is issued before `connect` or after `disconnect`.
    #[error("session to {host} is not connected")]
    NotConnected {
        /// Target device.
        host: String,
    },
    /// Raised when the device or the SSH client rejects credentials.
    #[error("authentication to {host} failed: {message}")]
    Authentication {
        /// Target device.
        host: String,
        /// Description of the rejection.
        message: String,
    },
    /// Raised when the expected prompt does not arrive in time.
    #[error("timed out after {seconds}s waiting for {waiting_for} from {host}")]
    Timeout {
        /// Target device.
        host: String,
        /// What the session was waiting for.
        waiting_for: String,
        /// Timeout that elapsed.
        seconds: u64,
    },
    /// Raised when the remote shell goes away mid-conversation.
    #[error("session to {host} closed unexpectedly: {message}")]
    Closed {
        /// Target device.
        host: String,
        /// Tail of the output received before the channel closed.
        message: String,
    },
    /// Raised when writing to the transport fails.
    #[error("I/O error talking to {host}: {message}")]
    Io {
        /// Target device.
        host: String,
        /// Underlying error message.
        message: String,
    },
    /// Raised when a prompt or expect pattern is not a valid regex.
    #[error("invalid prompt pattern {pattern:?}: {message}")]
    InvalidPattern {
        /// Offending pattern.
        pattern: String,
        /// Regex compiler message.
        message: String,
    },
    /// Raised when the device answers a command with an error marker.
    #[error("{host} rejected command {command:?}: {message}")]
    CommandRejected {
        /// Target device.
        host: String,
        /// Command the device refused.
        command: String,
        /// Error line reported by the device.
        message: String,
    },
}

impl SessionError {
    /// Returns `true` when the error reflects a failure to talk to the device
    /// rather than a local configuration mistake.
    #[must_use]
    pub const fn is_connection_failure(&self) -> bool {
        !matches!(self, Self::InvalidPattern { .. })
    }

    pub(crate) fn invalid_pattern(pattern: &str, err: &regex::Error) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_owned(),
            message: err.to_string(),
        }
    }
}
