//! Error types for the networking module.

use std::io;
use std::sync::Arc;

/// Network-specific errors.
///
/// I/O causes are kept behind an `Arc` so the error stays `Clone`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NetworkError {
    /// A required argument was missing or malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// The host name could not be resolved to any address.
    #[error("Could not resolve host '{host}': {message}")]
    Resolution {
        /// The host that failed to resolve.
        host: String,
        /// Resolver diagnostic.
        message: String,
    },
    /// The handshake did not finish within the deadline.
    #[error("Connection attempt timed out")]
    Timeout,
    /// The handshake failed for a reason other than the deadline.
    #[error("Connection error: {message}")]
    Connection {
        /// Human-readable summary.
        message: String,
        /// The captured cause, if one was observed.
        #[source]
        source: Option<Arc<io::Error>>,
    },
    /// A write was attempted with no live connection.
    #[error("Not connected")]
    NotConnected,
    /// A connect was attempted while a connection is live.
    #[error("Already connected to {0}")]
    AlreadyConnected(String),
    /// The client has been disposed.
    #[error("Client has been disposed")]
    Disposed,
    /// The listening socket could not be bound.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        /// The address that was requested.
        address: String,
        /// The underlying bind failure.
        #[source]
        source: Arc<io::Error>,
    },
    /// I/O error on a live connection.
    #[error("I/O error: {0}")]
    Io(#[source] Arc<io::Error>),
}

impl NetworkError {
    /// Create a connection error wrapping a captured cause.
    pub fn connection(source: io::Error) -> Self {
        Self::Connection {
            message: source.to_string(),
            source: Some(Arc::new(source)),
        }
    }

    /// Create a connection error without a captured cause.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Check if this error is a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl From<io::Error> for NetworkError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

/// A specialized Result type for network operations.
pub type Result<T> = std::result::Result<T, NetworkError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_connection_error_keeps_source() {
        let err = NetworkError::connection(io::Error::from(io::ErrorKind::ConnectionRefused));
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("Connection error"));
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_generic_connection_error_has_no_source() {
        let err = NetworkError::connection_failed("connection attempt failed");
        assert!(err.source().is_none());
        assert_eq!(err.to_string(), "Connection error: connection attempt failed");
    }

    #[test]
    fn test_io_conversion() {
        let err: NetworkError = io::Error::from(io::ErrorKind::BrokenPipe).into();
        assert!(matches!(err, NetworkError::Io(_)));
        assert!(NetworkError::Timeout.is_timeout());
    }
}
