//! Error types for the console client.

use std::io;
use thiserror::Error;

/// Client errors.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Failed to connect to the server.
    ///
    /// Usually the server is not running or listens on another address.
    #[error("Failed to connect to {addr}: {source}")]
    Connect { addr: String, source: io::Error },

    /// I/O error on the connection or the local console.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_display() {
        let error = ClientError::Connect {
            addr: "127.0.0.1:12345".to_string(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        let display = error.to_string();
        assert!(display.contains("Failed to connect"));
        assert!(display.contains("127.0.0.1:12345"));
    }

    #[test]
    fn test_io_error_from() {
        let error: ClientError = io::Error::new(io::ErrorKind::BrokenPipe, "pipe").into();
        assert!(matches!(error, ClientError::Io(_)));
    }
}
