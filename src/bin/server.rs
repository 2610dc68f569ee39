//! ghostwire server binary: the TLS-terminating relay node.
//!
//! Configuration comes from the environment (`PASSWORD` and `TARGET_HOST`
//! are required); the certificate and key are loaded once at startup from
//! `CERT_FILE` / `KEY_FILE`; logging verbosity from `RUST_LOG`.

use std::sync::Arc;

use tokio::net::TcpListener;

use ghostwire::config::ServerConfig;
use ghostwire::runtime::SessionRuntime;
use ghostwire::server::ServerSession;
use ghostwire::tls::TlsServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Arc::new(ServerConfig::from_env()?);
    let tls = Arc::new(TlsServer::from_pem_files(
        &config.cert_file,
        &config.key_file,
    )?);

    let listener = TcpListener::bind(config.bind_addr()).await?;
    tracing::info!("service available at {}", config.bind_addr());
    tracing::info!(
        "decoy target at {}:{}",
        config.target_host,
        config.target_port
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
            let tls = Arc::clone(&tls);
            async move {
                stream.set_nodelay(true)?;
                tracing::debug!("{}: connection accepted", peer);
                let stream = tls.accept(stream).await?;
                ServerSession::new(stream, config).run().await
            }
        })
        .await?;

    Ok(())
}
