//! Error types for the relay-link client.

use std::time::Duration;
use thiserror::Error;

/// Errors produced by the relay-link protocol engine.
///
/// Validation errors (`BadSubject`, `BadAuthentication`, `InvalidPayloadType`,
/// `MaxPayloadExceeded`) are raised synchronously by the call that violates
/// them. Asynchronous failures (`Timeout`, `ConnectionClosed`) fail only the
/// pending operation they belong to and never tear down unrelated work.
#[derive(Error, Debug, Clone)]
pub enum RelayLinkError {
    /// The subject is empty or contains whitespace/control characters.
    #[error("Invalid subject: {0}")]
    BadSubject(String),

    /// Conflicting or incomplete authentication configuration
    /// (e.g. user/pass together with a token).
    #[error("Invalid authentication configuration: {0}")]
    BadAuthentication(String),

    /// The payload value does not match the configured payload mode.
    #[error("Invalid payload: {0}")]
    InvalidPayloadType(String),

    /// The encoded payload exceeds the configured maximum size.
    #[error("Payload of {size} bytes exceeds maximum of {limit}")]
    MaxPayloadExceeded { size: usize, limit: usize },

    /// The connection is closed; no further operations are accepted.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The connection is draining; new work is not accepted.
    #[error("Connection draining")]
    ConnectionDraining,

    /// The handshake or transport failed while establishing the connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A request or drain did not complete within its deadline.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The broker reported a protocol-level error (`-ERR`).
    #[error("Server error: {0}")]
    ServerError(String),
}

/// Result type for relay-link operations.
pub type Result<T> = std::result::Result<T, RelayLinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = RelayLinkError::BadSubject("subject cannot be empty".to_string());
        assert!(err.to_string().contains("Invalid subject"));

        let err = RelayLinkError::MaxPayloadExceeded { size: 2048, limit: 1024 };
        assert!(err.to_string().contains("2048"));
        assert!(err.to_string().contains("1024"));

        let err = RelayLinkError::Timeout(Duration::from_millis(250));
        assert!(err.to_string().contains("250"));
    }

    #[test]
    fn test_errors_are_cloneable() {
        let err = RelayLinkError::ConnectionFailed("transport closed".to_string());
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
    }
}
