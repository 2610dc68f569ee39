//! Relay-node session state machine.
//!
//! `InjectorAttempt → (Confirmed | Disguised) → Relaying → Closed`.
//!
//! The inbound stream arrives already TLS-terminated. If the first buffer
//! is a valid injector handshake carrying the right secret, the node
//! connects to the requested destination and echoes the handshake. For
//! anything else the node behaves exactly like a TLS proxy for the
//! configured decoy target: it forwards the bytes it read, verbatim, and
//! relays from there. No decode or authentication failure is ever
//! distinguishable on the wire.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::protocol::injector::{self, Handshake};
use crate::relay;

/// Session states. The outbound connection travels inside the variants.
enum State {
    InjectorAttempt,
    Confirmed { dest: TcpStream },
    Disguised { decoy: TcpStream, replay: Vec<u8> },
    Relaying { dest: TcpStream },
    Closed,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            Self::InjectorAttempt => "injector_attempt",
            Self::Confirmed { .. } => "confirmed",
            Self::Disguised { .. } => "disguised",
            Self::Relaying { .. } => "relaying",
            Self::Closed => "closed",
        }
    }
}

/// One inbound tunnel session, from TLS-terminated stream to teardown.
pub struct ServerSession<S> {
    stream: S,
    config: Arc<ServerConfig>,
}

impl<S> ServerSession<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    pub fn new(stream: S, config: Arc<ServerConfig>) -> Self {
        Self { stream, config }
    }

    /// Run the session to completion. Only decoy-connect and relay-setup
    /// failures abort it; authentication failures divert to the decoy.
    pub async fn run(mut self) -> Result<()> {
        let mut state = State::InjectorAttempt;
        loop {
            tracing::debug!("server session: {}", state.name());
            state = match state {
                State::InjectorAttempt => self.injector_attempt().await?,
                State::Confirmed { dest } => State::Relaying { dest },
                State::Disguised { mut decoy, replay } => {
                    // pass through exactly what was read, never re-framed
                    decoy.write_all(&replay).await?;
                    State::Relaying { dest: decoy }
                }
                State::Relaying { mut dest } => {
                    relay::exchange(&mut self.stream, &mut dest, self.config.buffer_size).await;
                    State::Closed
                }
                State::Closed => return Ok(()),
            };
        }
    }

    /// Read the first buffer and try the authenticated path. Any failure
    /// in it (decode error, wrong version or secret, unreachable
    /// destination, failed echo) routes to the decoy instead, keeping
    /// the node indistinguishable from a conventional proxy.
    async fn injector_attempt(&mut self) -> Result<State> {
        let data =
            relay::read_buffer(&mut self.stream, self.config.buffer_size, self.config.timeout)
                .await?;

        match self.authenticate(&data).await {
            Ok(dest) => Ok(State::Confirmed { dest }),
            Err(e) => {
                tracing::debug!("injector handshake rejected: {}", e);
                let decoy = relay::connect(
                    &self.config.target_host,
                    self.config.target_port,
                    self.config.timeout,
                )
                .await?;
                Ok(State::Disguised {
                    decoy,
                    replay: data,
                })
            }
        }
    }

    async fn authenticate(&mut self, data: &[u8]) -> Result<TcpStream> {
        let handshake = Handshake::decode(data)?;

        if handshake.version != injector::VERSION {
            return Err(Error::VersionMismatch {
                expected: injector::VERSION,
                actual: handshake.version,
            });
        }
        if handshake.secret != self.config.secret {
            return Err(Error::Authentication);
        }

        let dest = relay::connect(&handshake.host, handshake.port, self.config.timeout).await?;

        // exact echo: the initiator rejects any deviation
        self.stream.write_all(&handshake.encode()?).await?;

        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::path::PathBuf;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn test_config(target: SocketAddr) -> Arc<ServerConfig> {
        Arc::new(ServerConfig {
            secret: "hunter2".to_string(),
            server_host: "127.0.0.1".to_string(),
            server_port: 443,
            target_host: target.ip().to_string(),
            target_port: target.port(),
            timeout: Duration::from_secs(5),
            buffer_size: 1024,
            cert_file: PathBuf::from("unused.pem"),
            key_file: PathBuf::from("unused.pem"),
        })
    }

    /// Listener that captures the first buffer it receives, answers with a
    /// fixed payload, and returns the captured bytes.
    fn capture_server(
        listener: TcpListener,
        response: &'static [u8],
    ) -> tokio::task::JoinHandle<Vec<u8>> {
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 2048];
            let n = stream.read(&mut buf).await.unwrap();
            stream.write_all(response).await.unwrap();
            buf.truncate(n);
            buf
        })
    }

    #[tokio::test]
    async fn test_valid_handshake_confirms_and_relays() {
        let dest_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dest_addr = dest_listener.local_addr().unwrap();
        let dest = capture_server(dest_listener, b"pong");

        // decoy must never be contacted on this path
        let decoy_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let decoy_addr = decoy_listener.local_addr().unwrap();

        let (near, mut far) = tokio::io::duplex(4096);
        let session = ServerSession::new(near, test_config(decoy_addr));
        let session_task = tokio::spawn(session.run());

        let sent = Handshake::new("hunter2", dest_addr.ip().to_string(), dest_addr.port());
        far.write_all(&sent.encode().unwrap()).await.unwrap();

        // confirmation echoes every field exactly
        let mut buf = vec![0u8; 1024];
        let n = far.read(&mut buf).await.unwrap();
        let echoed = Handshake::decode(&buf[..n]).unwrap();
        assert_eq!(echoed, sent);

        far.write_all(b"ping").await.unwrap();
        let n = far.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"pong");

        assert_eq!(dest.await.unwrap(), b"ping");

        drop(far);
        session_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_wrong_secret_diverts_to_decoy_verbatim() {
        let decoy_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let decoy_addr = decoy_listener.local_addr().unwrap();
        let decoy = capture_server(decoy_listener, b"HTTP/1.1 200 OK\r\n\r\n");

        let (near, mut far) = tokio::io::duplex(4096);
        let session = ServerSession::new(near, test_config(decoy_addr));
        let session_task = tokio::spawn(session.run());

        let probe = Handshake::new("wrong-secret", "example.com", 443)
            .encode()
            .unwrap();
        far.write_all(&probe).await.unwrap();

        // the decoy's answer comes back as if we had spoken to it directly
        let mut buf = vec![0u8; 1024];
        let n = far.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"HTTP/1.1 200 OK\r\n\r\n");

        // the decoy received the probe byte-for-byte
        assert_eq!(decoy.await.unwrap(), probe);

        drop(far);
        session_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_http_probe_diverts_to_decoy_verbatim() {
        let decoy_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let decoy_addr = decoy_listener.local_addr().unwrap();
        let decoy = capture_server(decoy_listener, b"HTTP/1.1 404 Not Found\r\n\r\n");

        let (near, mut far) = tokio::io::duplex(4096);
        let session = ServerSession::new(near, test_config(decoy_addr));
        let session_task = tokio::spawn(session.run());

        let probe = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
        far.write_all(probe).await.unwrap();

        let mut buf = vec![0u8; 1024];
        let n = far.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"HTTP/1.1 404 Not Found\r\n\r\n");

        assert_eq!(decoy.await.unwrap(), probe.to_vec());

        drop(far);
        session_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_truncated_frame_diverts_to_decoy() {
        let decoy_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let decoy_addr = decoy_listener.local_addr().unwrap();
        let decoy = capture_server(decoy_listener, b"ok");

        let (near, mut far) = tokio::io::duplex(4096);
        let session = ServerSession::new(near, test_config(decoy_addr));
        let session_task = tokio::spawn(session.run());

        // version byte + secret length claiming more bytes than sent
        let probe = vec![0x01, 0xff, 0x41];
        far.write_all(&probe).await.unwrap();

        let mut buf = [0u8; 2];
        far.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ok");

        assert_eq!(decoy.await.unwrap(), probe);

        drop(far);
        session_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_destination_diverts_to_decoy() {
        // valid secret, but the requested destination refuses connections
        let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = unused.local_addr().unwrap();
        drop(unused);

        let decoy_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let decoy_addr = decoy_listener.local_addr().unwrap();
        let decoy = capture_server(decoy_listener, b"ok");

        let (near, mut far) = tokio::io::duplex(4096);
        let session = ServerSession::new(near, test_config(decoy_addr));
        let session_task = tokio::spawn(session.run());

        let probe = Handshake::new("hunter2", dead_addr.ip().to_string(), dead_addr.port())
            .encode()
            .unwrap();
        far.write_all(&probe).await.unwrap();

        let mut buf = [0u8; 2];
        far.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ok");

        assert_eq!(decoy.await.unwrap(), probe);

        drop(far);
        session_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_eof_before_handshake_fails_session() {
        let decoy_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let decoy_addr = decoy_listener.local_addr().unwrap();

        let (near, far) = tokio::io::duplex(4096);
        let session = ServerSession::new(near, test_config(decoy_addr));
        drop(far);

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }
}
