//! Injector handshake codec.
//!
//! The private frame exchanged inside the TLS channel, identical in both
//! directions: version(1) + secret_len(1) + secret + host_len(1) + host +
//! port(2, big-endian). The initiator sends it as a request; the relay
//! node echoes it as confirmation. Only flow direction and which fields
//! the receiver validates distinguish the two.

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};
use crate::protocol::Reader;

/// Handshake frame version.
pub const VERSION: u8 = 0x01;

/// Maximum length of a length-prefixed field (one-byte prefix).
pub const MAX_FIELD_LEN: usize = 255;

/// A decoded (or to-be-encoded) handshake frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub version: u8,
    pub secret: String,
    pub host: String,
    pub port: u16,
}

impl Handshake {
    pub fn new(secret: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            version: VERSION,
            secret: secret.into(),
            host: host.into(),
            port,
        }
    }

    /// Encode the frame. Fails rather than silently truncating when a
    /// field exceeds its one-byte length prefix.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.secret.len() > MAX_FIELD_LEN {
            return Err(Error::FieldTooLong {
                field: "secret",
                len: self.secret.len(),
                max: MAX_FIELD_LEN,
            });
        }
        if self.host.len() > MAX_FIELD_LEN {
            return Err(Error::FieldTooLong {
                field: "host",
                len: self.host.len(),
                max: MAX_FIELD_LEN,
            });
        }

        let mut buf = BytesMut::with_capacity(5 + self.secret.len() + self.host.len());
        buf.put_u8(self.version);
        buf.put_u8(self.secret.len() as u8);
        buf.put_slice(self.secret.as_bytes());
        buf.put_u8(self.host.len() as u8);
        buf.put_slice(self.host.as_bytes());
        buf.put_u16(self.port);
        Ok(buf.to_vec())
    }

    /// Decode a frame, rejecting truncated buffers and non-UTF-8 fields.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(buf);
        let version = reader.read_u8()?;

        let secret_len = reader.read_u8()? as usize;
        let secret = std::str::from_utf8(reader.take(secret_len)?)
            .map_err(|_| Error::InvalidEncoding("secret"))?
            .to_string();

        let host_len = reader.read_u8()? as usize;
        let host = std::str::from_utf8(reader.take(host_len)?)
            .map_err(|_| Error::InvalidEncoding("host"))?
            .to_string();

        let port = reader.read_u16()?;

        Ok(Self {
            version,
            secret,
            host,
            port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_roundtrip() {
        let handshake = Handshake::new("hunter2", "example.com", 443);
        let bytes = handshake.encode().unwrap();
        let decoded = Handshake::decode(&bytes).unwrap();
        assert_eq!(decoded.version, VERSION);
        assert_eq!(decoded, handshake);
    }

    #[test]
    fn test_handshake_wire_layout() {
        let bytes = Handshake::new("pw", "a.io", 80).encode().unwrap();
        assert_eq!(
            bytes,
            vec![0x01, 0x02, b'p', b'w', 0x04, b'a', b'.', b'i', b'o', 0x00, 0x50]
        );
    }

    #[test]
    fn test_encode_rejects_oversized_secret() {
        let handshake = Handshake::new("x".repeat(256), "example.com", 443);
        assert!(matches!(
            handshake.encode(),
            Err(Error::FieldTooLong {
                field: "secret",
                len: 256,
                max: 255
            })
        ));
    }

    #[test]
    fn test_encode_rejects_oversized_host() {
        let handshake = Handshake::new("pw", "h".repeat(300), 443);
        assert!(matches!(
            handshake.encode(),
            Err(Error::FieldTooLong { field: "host", .. })
        ));
    }

    #[test]
    fn test_encode_accepts_255_byte_fields() {
        let handshake = Handshake::new("s".repeat(255), "h".repeat(255), 65535);
        let decoded = Handshake::decode(&handshake.encode().unwrap()).unwrap();
        assert_eq!(decoded, handshake);
    }

    #[test]
    fn test_decode_rejects_truncation_at_every_boundary() {
        let bytes = Handshake::new("hunter2", "example.com", 443)
            .encode()
            .unwrap();
        for cut in 0..bytes.len() {
            assert!(
                matches!(Handshake::decode(&bytes[..cut]), Err(Error::Truncated { .. })),
                "cut at {} should be truncated",
                cut
            );
        }
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        // version, secret_len=2, invalid bytes, host_len=1, 'a', port
        let bytes = vec![0x01, 0x02, 0xff, 0xfe, 0x01, b'a', 0x00, 0x50];
        assert!(matches!(
            Handshake::decode(&bytes),
            Err(Error::InvalidEncoding("secret"))
        ));
    }

    #[test]
    fn test_decode_preserves_foreign_version() {
        // decoding does not judge the version; validation is the caller's
        let mut bytes = Handshake::new("pw", "h", 1).encode().unwrap();
        bytes[0] = 0x7f;
        assert_eq!(Handshake::decode(&bytes).unwrap().version, 0x7f);
    }
}
