//! Environment-variable configuration for the two endpoints.
//!
//! Logging verbosity is not a field here: the binaries honor `RUST_LOG`
//! through the tracing subscriber's environment filter.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::injector;

/// Default connection/handshake timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// Default relay copy-buffer size in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Configuration for the local SOCKS5 endpoint (the initiator).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Shared secret sent in the injector handshake
    pub secret: String,
    /// Relay node to tunnel through
    pub server_host: String,
    pub server_port: u16,
    /// Local bind address for the SOCKS5 listener
    pub client_host: String,
    pub client_port: u16,
    pub timeout: Duration,
    pub buffer_size: usize,
}

impl ClientConfig {
    /// Load from the environment. `PASSWORD` and `SERVER_HOST` are
    /// required; everything else has a default.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            secret: required("PASSWORD")?,
            server_host: required("SERVER_HOST")?,
            server_port: parsed("SERVER_PORT", 443)?,
            client_host: var_or("CLIENT_HOST", "0.0.0.0"),
            client_port: parsed("CLIENT_PORT", 1080)?,
            timeout: Duration::from_secs(parsed("TIMEOUT", DEFAULT_TIMEOUT_SECS)?),
            buffer_size: parsed("BUFFER_SIZE", DEFAULT_BUFFER_SIZE)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_secret(&self.secret)?;
        if self.server_host.is_empty() {
            return Err(Error::config("SERVER_HOST must not be empty"));
        }
        if self.buffer_size == 0 {
            return Err(Error::config("BUFFER_SIZE must be positive"));
        }
        Ok(())
    }

    /// Local listener address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.client_host, self.client_port)
    }
}

/// Configuration for the relay-node endpoint.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Shared secret expected in the injector handshake
    pub secret: String,
    /// Bind address for the TLS listener
    pub server_host: String,
    pub server_port: u16,
    /// Decoy target for unauthenticated traffic
    pub target_host: String,
    pub target_port: u16,
    pub timeout: Duration,
    pub buffer_size: usize,
    /// PEM certificate chain and private key, loaded once at startup
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

impl ServerConfig {
    /// Load from the environment. `PASSWORD` and `TARGET_HOST` are
    /// required; everything else has a default.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            secret: required("PASSWORD")?,
            server_host: var_or("SERVER_HOST", "0.0.0.0"),
            server_port: parsed("SERVER_PORT", 443)?,
            target_host: required("TARGET_HOST")?,
            target_port: parsed("TARGET_PORT", 80)?,
            timeout: Duration::from_secs(parsed("TIMEOUT", DEFAULT_TIMEOUT_SECS)?),
            buffer_size: parsed("BUFFER_SIZE", DEFAULT_BUFFER_SIZE)?,
            cert_file: PathBuf::from(var_or("CERT_FILE", "./_data/cert.pem")),
            key_file: PathBuf::from(var_or("KEY_FILE", "./_data/key.pem")),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_secret(&self.secret)?;
        if self.target_host.is_empty() {
            return Err(Error::config("TARGET_HOST must not be empty"));
        }
        if self.buffer_size == 0 {
            return Err(Error::config("BUFFER_SIZE must be positive"));
        }
        Ok(())
    }

    /// TLS listener address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn validate_secret(secret: &str) -> Result<()> {
    if secret.is_empty() {
        return Err(Error::config("PASSWORD must not be empty"));
    }
    // the handshake carries the secret behind a one-byte length prefix
    if secret.len() > injector::MAX_FIELD_LEN {
        return Err(Error::config(format!(
            "PASSWORD exceeds {} bytes",
            injector::MAX_FIELD_LEN
        )));
    }
    Ok(())
}

fn required(key: &str) -> Result<String> {
    env::var(key).map_err(|_| Error::config(format!("{} must be set", key)))
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::config(format!("invalid {}: {}", key, e))),
        Err(_) => Ok(default),
    }
}
