//! SOCKS5 message codec (RFC 1928 subset).
//!
//! Encodes and decodes the greeting, method-selection reply, connection
//! request, and reply messages. All three address types are decodable;
//! which of them (and which commands) are acceptable is decided by the
//! caller, not here.

use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};
use crate::protocol::Reader;

/// SOCKS protocol version handled by this codec.
pub const VERSION: u8 = 0x05;

/// "No authentication required" method identifier.
pub const METHOD_NO_AUTH: u8 = 0x00;
/// "No acceptable methods" method identifier.
pub const METHOD_NO_ACCEPTABLE: u8 = 0xff;

/// Address type tags.
pub const ATYP_IPV4: u8 = 0x01;
pub const ATYP_DOMAIN: u8 = 0x03;
pub const ATYP_IPV6: u8 = 0x04;

/// Request command field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Bind,
    UdpAssociate,
    /// Command value outside the RFC set. Kept rather than rejected at
    /// decode time so the policy layer can still echo a reply.
    Unknown(u8),
}

impl Command {
    fn from_u8(v: u8) -> Self {
        match v {
            0x01 => Self::Connect,
            0x02 => Self::Bind,
            0x03 => Self::UdpAssociate,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Connect => 0x01,
            Self::Bind => 0x02,
            Self::UdpAssociate => 0x03,
            Self::Unknown(other) => other,
        }
    }
}

/// Reply status codes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCode {
    Succeeded = 0x00,
    GeneralFailure = 0x01,
    NotAllowed = 0x02,
    NetworkUnreachable = 0x03,
    HostUnreachable = 0x04,
    ConnectionRefused = 0x05,
    TtlExpired = 0x06,
    CommandNotSupported = 0x07,
    AddressTypeNotSupported = 0x08,
}

impl ReplyCode {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0x00 => Ok(Self::Succeeded),
            0x01 => Ok(Self::GeneralFailure),
            0x02 => Ok(Self::NotAllowed),
            0x03 => Ok(Self::NetworkUnreachable),
            0x04 => Ok(Self::HostUnreachable),
            0x05 => Ok(Self::ConnectionRefused),
            0x06 => Ok(Self::TtlExpired),
            0x07 => Ok(Self::CommandNotSupported),
            0x08 => Ok(Self::AddressTypeNotSupported),
            other => Err(Error::UnknownReplyCode(other)),
        }
    }
}

/// A destination identity: ATYP tag plus its value.
///
/// `Domain` carries the raw name without any resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Ipv4(Ipv4Addr),
    Domain(String),
    Ipv6(Ipv6Addr),
}

impl Address {
    /// RFC 1928 address type tag.
    pub fn atyp(&self) -> u8 {
        match self {
            Self::Ipv4(_) => ATYP_IPV4,
            Self::Domain(_) => ATYP_DOMAIN,
            Self::Ipv6(_) => ATYP_IPV6,
        }
    }

    /// Textual host form, the one the injector handshake carries.
    pub fn host(&self) -> String {
        match self {
            Self::Ipv4(ip) => ip.to_string(),
            Self::Domain(name) => name.clone(),
            Self::Ipv6(ip) => ip.to_string(),
        }
    }

    fn decode(reader: &mut Reader<'_>, atyp: u8) -> Result<Self> {
        match atyp {
            ATYP_IPV4 => {
                let octets: [u8; 4] = reader.take(4)?.try_into().map_err(|_| Error::Truncated {
                    expected: 4,
                    actual: 0,
                })?;
                Ok(Self::Ipv4(Ipv4Addr::from(octets)))
            }
            ATYP_DOMAIN => {
                let len = reader.read_u8()? as usize;
                let name = std::str::from_utf8(reader.take(len)?)
                    .map_err(|_| Error::InvalidEncoding("domain name"))?;
                Ok(Self::Domain(name.to_string()))
            }
            ATYP_IPV6 => {
                let octets: [u8; 16] =
                    reader.take(16)?.try_into().map_err(|_| Error::Truncated {
                        expected: 16,
                        actual: 0,
                    })?;
                Ok(Self::Ipv6(Ipv6Addr::from(octets)))
            }
            other => Err(Error::UnknownAddressType(other)),
        }
    }

    fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            Self::Ipv4(ip) => buf.put_slice(&ip.octets()),
            Self::Domain(name) => {
                buf.put_u8(name.len() as u8);
                buf.put_slice(name.as_bytes());
            }
            Self::Ipv6(ip) => buf.put_slice(&ip.octets()),
        }
    }
}

/// Client greeting: version plus offered authentication methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    pub version: u8,
    pub methods: Vec<u8>,
}

impl Greeting {
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(buf);
        let version = reader.read_u8()?;
        if version != VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        let count = reader.read_u8()? as usize;
        let methods = reader.take(count)?.to_vec();
        Ok(Self { version, methods })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(2 + self.methods.len());
        buf.put_u8(self.version);
        buf.put_u8(self.methods.len() as u8);
        buf.put_slice(&self.methods);
        buf.to_vec()
    }
}

/// Method-selection reply sent in answer to a greeting.
pub fn encode_method_reply(method: u8) -> [u8; 2] {
    [VERSION, method]
}

/// Connection request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub version: u8,
    pub command: Command,
    pub address: Address,
    pub port: u16,
}

impl Request {
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(buf);
        let version = reader.read_u8()?;
        if version != VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        let command = Command::from_u8(reader.read_u8()?);
        let _rsv = reader.read_u8()?;
        let atyp = reader.read_u8()?;
        let address = Address::decode(&mut reader, atyp)?;
        let port = reader.read_u16()?;
        Ok(Self {
            version,
            command,
            address,
            port,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(6 + 257);
        buf.put_u8(self.version);
        buf.put_u8(self.command.as_u8());
        buf.put_u8(0x00);
        buf.put_u8(self.address.atyp());
        self.address.encode_into(&mut buf);
        buf.put_u16(self.port);
        buf.to_vec()
    }
}

/// Reply to a connection request. Error replies echo the request's
/// address and port back, so request and reply always share the same
/// address-type field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: ReplyCode,
    pub address: Address,
    pub port: u16,
}

impl Reply {
    pub fn new(code: ReplyCode, address: Address, port: u16) -> Self {
        Self {
            code,
            address,
            port,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(6 + 257);
        buf.put_u8(VERSION);
        buf.put_u8(self.code as u8);
        buf.put_u8(0x00);
        buf.put_u8(self.address.atyp());
        self.address.encode_into(&mut buf);
        buf.put_u16(self.port);
        buf.to_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(buf);
        let version = reader.read_u8()?;
        if version != VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        let code = ReplyCode::from_u8(reader.read_u8()?)?;
        let _rsv = reader.read_u8()?;
        let atyp = reader.read_u8()?;
        let address = Address::decode(&mut reader, atyp)?;
        let port = reader.read_u16()?;
        Ok(Self {
            code,
            address,
            port,
        })
    }
}
