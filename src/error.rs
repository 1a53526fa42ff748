//! Centralized error types for mailshell.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailshell library.
#[derive(Error, Debug)]
pub enum MailError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The session could not reach or authenticate against the server.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// A session call was attempted without a live connection.
    #[error("Not connected")]
    NotConnected,

    /// The server rejected or failed a single protocol call.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The character encoding is not supported.
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// A MIME decoding error.
    #[error("MIME decoding error: {0}")]
    MimeError(String),

    /// The HTML-to-text renderer failed or exited non-zero.
    #[error("HTML rendering failed: {0}")]
    Render(String),

    /// The configuration could not be read or written.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The background worker could not be started or stopped.
    #[error("Worker error: {0}")]
    Worker(String),
}

/// Convenience alias for `Result<T, MailError>`.
pub type Result<T> = std::result::Result<T, MailError>;

impl MailError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this failure means the session is gone and must be
    /// re-established before the next call.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::NotConnected | Self::Io { .. }
        )
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare, prefer `MailError::io`).
impl From<std::io::Error> for MailError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_errors_are_classified() {
        assert!(MailError::Connection("refused".into()).is_connection_error());
        assert!(MailError::NotConnected.is_connection_error());
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert!(MailError::from(io).is_connection_error());
    }

    #[test]
    fn test_call_errors_are_not_connection_errors() {
        assert!(!MailError::Protocol("NO [TRYCREATE]".into()).is_connection_error());
        assert!(!MailError::Render("exit 1".into()).is_connection_error());
    }

    #[test]
    fn test_display_includes_path() {
        let err = MailError::io(
            "/tmp/x.html",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(err.to_string().contains("/tmp/x.html"));
    }
}
