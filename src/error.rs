//! Error types for zero-rrdcached.

use thiserror::Error;

/// Result type for zero-rrdcached operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error type for zero-rrdcached.
#[derive(Debug, Error)]
pub enum Error {
    /// The daemon answered a command with status `-1`.
    ///
    /// Only the caller that submitted the command sees this error; the
    /// connection stays usable.
    #[error("{command} failed: {message}")]
    Command {
        /// Leading token of the command text (e.g. `FLUSH`)
        command: String,
        /// Message sent by the daemon after the status token
        message: String,
    },

    /// Protocol violation (malformed status line, unmatched response, etc.)
    ///
    /// Fatal for the connection: every outstanding request is rejected
    /// with a copy of this error.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O error while establishing the connection
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection closed while the request was outstanding
    #[error("Connection is closed")]
    ConnectionClosed,

    /// A BATCH error-summary line did not match `<index> <message>`
    #[error("Malformed BATCH summary line: {0:?}")]
    BatchSummary(String),

    /// The reply did not arrive before the configured deadline
    #[error("Timed out waiting for a reply to {0}")]
    Timeout(String),

    /// Invalid usage (e.g., empty batch, embedded newline)
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),
}

impl From<core::convert::Infallible> for Error {
    fn from(never: core::convert::Infallible) -> Self {
        match never {}
    }
}

impl Error {
    /// Returns true if the error indicates the connection was torn down.
    ///
    /// The next submission on the same client opens a fresh connection.
    pub fn is_connection_broken(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::ConnectionClosed | Error::Protocol(_)
        )
    }

    /// Get the leading command token if this is a daemon command error.
    pub fn command(&self) -> Option<&str> {
        match self {
            Error::Command { command, .. } => Some(command),
            _ => None,
        }
    }
}
