//! Error types for the tunnel.

use thiserror::Error;

/// Result type alias for tunnel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while handling a session.
///
/// Variants fall into two classes: protocol errors (malformed or
/// policy-violating wire data) and I/O errors (connect, read, write
/// failures). Either class aborts only the session it occurred in.
#[derive(Error, Debug)]
pub enum Error {
    /// SOCKS message carried an unsupported protocol version
    #[error("unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    /// Client offered no authentication method we accept
    #[error("no acceptable authentication method")]
    NoAcceptableMethod,

    /// SOCKS command other than CONNECT
    #[error("unsupported command: 0x{0:02x}")]
    UnsupportedCommand(u8),

    /// Address type decodable but rejected by policy (IPv6)
    #[error("unsupported address type: 0x{0:02x}")]
    UnsupportedAddressType(u8),

    /// Address type tag outside the RFC 1928 set
    #[error("unknown address type: 0x{0:02x}")]
    UnknownAddressType(u8),

    /// Reply status code outside the RFC 1928 set
    #[error("unknown reply code: 0x{0:02x}")]
    UnknownReplyCode(u8),

    /// Message shorter than its framing requires
    #[error("truncated message: need {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// Length-prefixed field was not valid UTF-8
    #[error("invalid field encoding: {0}")]
    InvalidEncoding(&'static str),

    /// Field exceeds its one-byte length prefix
    #[error("{field} too long: {len} bytes exceeds the {max}-byte limit")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// Handshake protocol version mismatch
    #[error("protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u8, actual: u8 },

    /// Shared secret did not match
    #[error("authentication failed")]
    Authentication,

    /// Echoed handshake field differs from what was sent
    #[error("handshake echo mismatch: {0}")]
    EchoMismatch(&'static str),

    /// Connection attempt exceeded the configured timeout
    #[error("connection timeout after {0}ms")]
    Timeout(u64),

    /// Network I/O error
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// TLS setup error
    #[error("TLS error: {0}")]
    Tls(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new TLS error
    pub fn tls(msg: impl Into<String>) -> Self {
        Error::Tls(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Authentication;
        assert_eq!(err.to_string(), "authentication failed");

        let err = Error::Timeout(5000);
        assert_eq!(err.to_string(), "connection timeout after 5000ms");

        let err = Error::VersionMismatch {
            expected: 0x01,
            actual: 0x02,
        };
        assert_eq!(
            err.to_string(),
            "protocol version mismatch: expected 1, got 2"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
        let err: Error = io.into();
        assert!(matches!(err, Error::Network(_)));
    }
}
