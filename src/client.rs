//! Initiator session state machine.
//!
//! Drives one local SOCKS5 connection through negotiation, opens the
//! encrypted channel to the relay node, authenticates with the injector
//! handshake, and hands both connections to the relay engine:
//!
//! `AwaitGreeting → AwaitRequest → ConnectingToRelay → InjectorHandshake
//! → Relaying → Closed`, with any error aborting the session.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::protocol::injector::{self, Handshake};
use crate::protocol::socks::{
    self, Address, Command, Greeting, Reply, ReplyCode, Request,
};
use crate::relay;
use crate::tls::TlsClient;

/// Capability to open an encrypted stream to the relay node.
///
/// The state machine only depends on this seam, so tests can substitute
/// in-memory streams for the TLS transport.
#[async_trait]
pub trait RelayConnector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin;

    async fn connect(&self) -> Result<Self::Stream>;
}

/// Production connector: TCP to the configured relay node, upgraded to
/// TLS with verification disabled (the secret is the trust anchor).
pub struct TlsRelayConnector {
    config: Arc<ClientConfig>,
    tls: TlsClient,
}

impl TlsRelayConnector {
    pub fn new(config: Arc<ClientConfig>) -> Result<Self> {
        Ok(Self {
            tls: TlsClient::new()?,
            config,
        })
    }
}

#[async_trait]
impl RelayConnector for TlsRelayConnector {
    type Stream = tokio_rustls::client::TlsStream<TcpStream>;

    async fn connect(&self) -> Result<Self::Stream> {
        let tcp = relay::connect(
            &self.config.server_host,
            self.config.server_port,
            self.config.timeout,
        )
        .await?;
        self.tls.connect(tcp, &self.config.server_host).await
    }
}

/// Session states. Connections travel inside the variants, so every exit
/// path releases them by dropping the state.
enum State<T> {
    AwaitGreeting,
    AwaitRequest,
    ConnectingToRelay { request: Request },
    InjectorHandshake { request: Request, relay: T },
    Relaying { relay: T },
    Closed,
}

impl<T> State<T> {
    fn name(&self) -> &'static str {
        match self {
            Self::AwaitGreeting => "await_greeting",
            Self::AwaitRequest => "await_request",
            Self::ConnectingToRelay { .. } => "connecting_to_relay",
            Self::InjectorHandshake { .. } => "injector_handshake",
            Self::Relaying { .. } => "relaying",
            Self::Closed => "closed",
        }
    }
}

/// One local SOCKS5 session, from greeting to teardown.
pub struct ClientSession<S, R: RelayConnector> {
    local: S,
    config: Arc<ClientConfig>,
    connector: Arc<R>,
}

impl<S, R> ClientSession<S, R>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
    R: RelayConnector,
{
    pub fn new(local: S, config: Arc<ClientConfig>, connector: Arc<R>) -> Self {
        Self {
            local,
            config,
            connector,
        }
    }

    /// Run the session to completion. Any protocol or I/O failure aborts
    /// it; both connections are closed on every exit path.
    pub async fn run(mut self) -> Result<()> {
        let mut state = State::AwaitGreeting;
        loop {
            tracing::debug!("client session: {}", state.name());
            state = match state {
                State::AwaitGreeting => self.await_greeting().await?,
                State::AwaitRequest => self.await_request().await?,
                State::ConnectingToRelay { request } => self.connect_relay(request).await?,
                State::InjectorHandshake { request, relay } => {
                    self.injector_handshake(request, relay).await?
                }
                State::Relaying { mut relay } => {
                    relay::exchange(&mut self.local, &mut relay, self.config.buffer_size).await;
                    State::Closed
                }
                State::Closed => return Ok(()),
            };
        }
    }

    async fn await_greeting(&mut self) -> Result<State<R::Stream>> {
        let buf = self.read_local().await?;
        let greeting = Greeting::decode(&buf)?;

        if !greeting.methods.contains(&socks::METHOD_NO_AUTH) {
            return Err(Error::NoAcceptableMethod);
        }

        self.local
            .write_all(&socks::encode_method_reply(socks::METHOD_NO_AUTH))
            .await?;
        Ok(State::AwaitRequest)
    }

    async fn await_request(&mut self) -> Result<State<R::Stream>> {
        let buf = self.read_local().await?;
        let request = Request::decode(&buf)?;

        if request.command != Command::Connect {
            self.reply(ReplyCode::CommandNotSupported, &request).await?;
            return Err(Error::UnsupportedCommand(request.command.as_u8()));
        }

        if let Address::Ipv6(_) = request.address {
            self.reply(ReplyCode::AddressTypeNotSupported, &request)
                .await?;
            return Err(Error::UnsupportedAddressType(socks::ATYP_IPV6));
        }

        Ok(State::ConnectingToRelay { request })
    }

    async fn connect_relay(&mut self, request: Request) -> Result<State<R::Stream>> {
        match self.connector.connect().await {
            Ok(relay) => {
                self.reply(ReplyCode::Succeeded, &request).await?;
                Ok(State::InjectorHandshake { request, relay })
            }
            Err(e) => {
                self.reply(ReplyCode::ConnectionRefused, &request).await?;
                Err(e)
            }
        }
    }

    /// Send the handshake and validate the relay node's echo. A mismatch
    /// in any field means corruption or a non-cooperating relay, and fails
    /// the session before any payload byte is relayed.
    async fn injector_handshake(
        &mut self,
        request: Request,
        mut relay: R::Stream,
    ) -> Result<State<R::Stream>> {
        let sent = Handshake::new(
            self.config.secret.clone(),
            request.address.host(),
            request.port,
        );
        relay.write_all(&sent.encode()?).await?;

        let buf =
            relay::read_buffer(&mut relay, self.config.buffer_size, self.config.timeout).await?;
        let echoed = Handshake::decode(&buf)?;

        if echoed.version != injector::VERSION {
            return Err(Error::VersionMismatch {
                expected: injector::VERSION,
                actual: echoed.version,
            });
        }
        if echoed.secret != self.config.secret {
            return Err(Error::Authentication);
        }
        if echoed.host != sent.host {
            return Err(Error::EchoMismatch("destination host"));
        }
        if echoed.port != sent.port {
            return Err(Error::EchoMismatch("destination port"));
        }

        Ok(State::Relaying { relay })
    }

    async fn read_local(&mut self) -> Result<Vec<u8>> {
        relay::read_buffer(&mut self.local, self.config.buffer_size, self.config.timeout).await
    }

    async fn reply(&mut self, code: ReplyCode, request: &Request) -> Result<()> {
        let reply = Reply::new(code, request.address.clone(), request.port);
        self.local.write_all(&reply.encode()).await?;
        Ok(())
    }
}
