//! Session runtime: the concurrent connection-acceptance loop.
//!
//! Accepts inbound connections and runs one independently-failing tokio
//! task per session. A failing handler is caught and logged at this
//! boundary; it never takes down the acceptor or other sessions. The
//! live-session counter is updated exactly once per session start and
//! once per session end, even when the handler fails or panics.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::error::Result;

/// Process-wide count of sessions currently in progress.
///
/// Observability only; never used for admission control.
#[derive(Debug, Default)]
pub struct SessionCounter {
    active: AtomicUsize,
}

impl SessionCounter {
    /// Number of sessions currently in flight.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn begin(&self) -> usize {
        self.active.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn end(&self) -> usize {
        self.active.fetch_sub(1, Ordering::SeqCst) - 1
    }
}

/// Decrements the counter on drop, so the end of a session is recorded
/// even when its handler panics.
struct SessionGuard {
    counter: Arc<SessionCounter>,
    peer: SocketAddr,
}

impl SessionGuard {
    fn enter(counter: Arc<SessionCounter>, peer: SocketAddr) -> Self {
        let active = counter.begin();
        tracing::info!("{}: session started, {} active", peer, active);
        Self { counter, peer }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let active = self.counter.end();
        tracing::info!("{}: session ended, {} active", self.peer, active);
    }
}

/// Signals graceful shutdown to a serving [`SessionRuntime`].
#[derive(Clone)]
pub struct RuntimeHandle {
    shutdown: Arc<watch::Sender<bool>>,
}

impl RuntimeHandle {
    /// Stop accepting new sessions; in-flight sessions run to completion.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Accept loop with per-session failure isolation and graceful shutdown.
pub struct SessionRuntime {
    sessions: Arc<SessionCounter>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl SessionRuntime {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            sessions: Arc::new(SessionCounter::default()),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    /// Live-session counter shared with all spawned sessions.
    pub fn sessions(&self) -> Arc<SessionCounter> {
        Arc::clone(&self.sessions)
    }

    /// Handle for signaling shutdown from another task.
    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            shutdown: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Serve connections from `listener` until [`RuntimeHandle::stop`] is
    /// called, then wait for in-flight sessions to drain.
    ///
    /// Each accepted connection runs `handler` in its own task; a handler
    /// error is logged and ends that session only.
    pub async fn serve<H, F>(&self, listener: TcpListener, handler: H) -> Result<()>
    where
        H: Fn(TcpStream, SocketAddr) -> F,
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let mut shutdown = self.shutdown_rx.clone();
        if *shutdown.borrow() {
            return Ok(());
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let guard = SessionGuard::enter(self.sessions(), peer);
                        let session = handler(stream, peer);
                        tokio::spawn(async move {
                            let _guard = guard;
                            if let Err(e) = session.await {
                                tracing::warn!("{}: terminated: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!("accept error: {}", e);
                    }
                },
                _ = shutdown.changed() => break,
            }
        }

        let active = self.sessions.active();
        if active > 0 {
            tracing::info!("waiting for {} sessions to terminate", active);
        }
        while self.sessions.active() > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Ok(())
    }
}

impl Default for SessionRuntime {
    fn default() -> Self {
        Self::new()
    }
}
