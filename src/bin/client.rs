//! ghostwire client binary: the local SOCKS5 endpoint.
//!
//! Configuration comes from the environment (`PASSWORD` and `SERVER_HOST`
//! are required); logging verbosity from `RUST_LOG`.

use std::sync::Arc;

use tokio::net::TcpListener;

use ghostwire::client::{ClientSession, TlsRelayConnector};
use ghostwire::config::ClientConfig;
use ghostwire::runtime::SessionRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Arc::new(ClientConfig::from_env()?);
    let connector = Arc::new(TlsRelayConnector::new(Arc::clone(&config))?);

    let listener = TcpListener::bind(config.bind_addr()).await?;
    tracing::info!("service available at {}", config.bind_addr());
    tracing::info!(
        "tunneling through {}:{}",
        config.server_host,
        config.server_port
    );

    let runtime = SessionRuntime::new();
    let handle = runtime.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("waiting for sessions termination...");
            handle.stop();
        }
    });

    let session_config = Arc::clone(&config);
    runtime
        .serve(listener, move |stream, peer| {
            let config = Arc::clone(&session_config);
            let connector = Arc::clone(&connector);
            async move {
                stream.set_nodelay(true)?;
                tracing::debug!("{}: connection accepted", peer);
                ClientSession::new(stream, config, connector).run().await
            }
        })
        .await?;

    Ok(())
}
