//! TLS capability: encrypted-stream establishment over raw TCP.
//!
//! The session engines depend on this module only through "upgrade this
//! connection" calls, keeping rustls out of the state machines.
//!
//! Security caveat: [`TlsClient`] performs no certificate or hostname
//! verification. The tunnel's trust anchor is the shared secret carried in
//! the injector handshake, not the relay node's certificate chain. This is
//! the intended trust model; enabling PKI validation would change the
//! observable behavior of the tunnel.

use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio::net::TcpStream;
use tokio_rustls::{client, server};

use crate::error::{Error, Result};

/// TLS client side: connects to the relay node, accepting any certificate.
#[derive(Clone)]
pub struct TlsClient {
    inner: tokio_rustls::TlsConnector,
}

impl TlsClient {
    pub fn new() -> Result<Self> {
        let provider = rustls::crypto::ring::default_provider();

        let config = rustls::ClientConfig::builder_with_provider(Arc::new(provider))
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::tls(format!("failed to set protocol versions: {}", e)))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
            .with_no_client_auth();

        Ok(Self {
            inner: tokio_rustls::TlsConnector::from(Arc::new(config)),
        })
    }

    /// Upgrade an established TCP connection to TLS.
    ///
    /// `server_name` only populates SNI; it is never verified.
    pub async fn connect(
        &self,
        stream: TcpStream,
        server_name: &str,
    ) -> Result<client::TlsStream<TcpStream>> {
        let name = ServerName::try_from(server_name.to_string())
            .map_err(|_| Error::tls(format!("invalid server name: {}", server_name)))?;

        Ok(self.inner.connect(name, stream).await?)
    }
}

/// TLS server side: terminates inbound connections with a certificate and
/// key loaded once at startup.
#[derive(Clone)]
pub struct TlsServer {
    inner: tokio_rustls::TlsAcceptor,
}

impl TlsServer {
    pub fn from_pem_files(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let certs = load_certificates(cert_path)?;
        if certs.is_empty() {
            return Err(Error::tls(format!(
                "no certificates found in {}",
                cert_path.display()
            )));
        }
        let key = load_private_key(key_path)?;

        let provider = rustls::crypto::ring::default_provider();

        let config = rustls::ServerConfig::builder_with_provider(Arc::new(provider))
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::tls(format!("failed to set protocol versions: {}", e)))?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| Error::tls(format!("failed to build server TLS config: {}", e)))?;

        Ok(Self {
            inner: tokio_rustls::TlsAcceptor::from(Arc::new(config)),
        })
    }

    /// Terminate TLS on an accepted TCP connection.
    pub async fn accept(&self, stream: TcpStream) -> Result<server::TlsStream<TcpStream>> {
        Ok(self.inner.accept(stream).await?)
    }
}

/// Load all certificates from a PEM file (supports chains).
fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = std::fs::File::open(path)
        .map_err(|e| Error::tls(format!("cannot open {}: {}", path.display(), e)))?;
    let mut reader = std::io::BufReader::new(file);

    rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::tls(format!("cannot parse {}: {}", path.display(), e)))
}

/// Load a private key from a PEM file (RSA, PKCS8, or EC).
fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = std::fs::File::open(path)
        .map_err(|e| Error::tls(format!("cannot open {}: {}", path.display(), e)))?;
    let mut reader = std::io::BufReader::new(file);

    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| Error::tls(format!("cannot parse {}: {}", path.display(), e)))?
        .ok_or_else(|| Error::tls(format!("no private key found in {}", path.display())))
}

/// Certificate verifier that accepts any certificate.
///
/// The relay node is authenticated by the injector secret, not by PKI.
#[derive(Debug)]
struct AcceptAnyCertificate;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_client_builds_without_trust_roots() {
        assert!(TlsClient::new().is_ok());
    }

    #[test]
    fn test_server_rejects_missing_cert_file() {
        let result = TlsServer::from_pem_files(
            &PathBuf::from("/nonexistent/cert.pem"),
            &PathBuf::from("/nonexistent/key.pem"),
        );
        assert!(matches!(result, Err(Error::Tls(_))));
    }
}
