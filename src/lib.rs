//! # ghostwire
//!
//! A disguised SOCKS5 tunneling proxy.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐   SOCKS5   ┌────────────┐    TLS + injector    ┌────────────┐
//! │ local client │ ─────────► │   client   │ ═══════════════════► │   server   │
//! └──────────────┘            │ (initiator)│                      │(relay node)│
//!                             └────────────┘                      └─────┬──────┘
//!                                                        authenticated │ anything else
//!                                                                      ▼
//!                                                          destination │ decoy target
//! ```
//!
//! The client speaks plain SOCKS5 locally and tunnels each connection over
//! TLS to the server. Inside the channel, a private length-prefixed
//! handshake (the injector protocol) authenticates the session and names
//! the destination. A connection that does not open with a valid handshake
//! (an active prober, for instance) is proxied verbatim to a fixed decoy
//! target, so the server is indistinguishable from an ordinary TLS front
//! for that target.
//!
//! ## Design Notes
//!
//! 1. **Trust model**: the shared secret authenticates both ends; the
//!    client deliberately performs no certificate validation (see
//!    [`tls::TlsClient`]).
//! 2. **Isolation**: every session runs in its own task; a failure ends
//!    that session only (see [`runtime::SessionRuntime`]).
//! 3. **Disguise**: the fallback path never parses or re-frames what it
//!    forwards (see [`server::ServerSession`]).

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod runtime;
pub mod server;
pub mod tls;

pub use error::{Error, Result};
