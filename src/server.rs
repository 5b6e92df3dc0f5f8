//! Accept loop and component wiring.

use std::future::Future;
use std::net::SocketAddr;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::hasher::Hasher;
use crate::registry::Registry;
use crate::session;
use crate::store::Store;

/// The shared-state server: owns the listener and spawns one session per
/// accepted connection, wired to a store and registry shared by all.
pub struct Server {
    listener: TcpListener,
}

impl Server {
    pub fn new(listener: TcpListener) -> Self {
        Self { listener }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop until `shutdown` resolves. An accept error stops
    /// further accepts but leaves live sessions running until shutdown.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server { listener } = self;
        let registry = Registry::spawn();
        let store = Store::spawn(Hasher::spawn(), registry.clone());
        tokio::pin!(shutdown);

        let mut accepting = true;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("server shutting down");
                    break;
                }
                accept_result = listener.accept(), if accepting => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            debug!(peer = %peer, "accepted connection");
                            tokio::spawn(session::run(stream, peer, store.clone(), registry.clone()));
                        }
                        Err(err) => {
                            error!(error = ?err, "accept failed, no longer accepting connections");
                            accepting = false;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Runs until SIGINT or SIGTERM is delivered.
    pub async fn run_until_shutdown(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = ?err, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(terminate) => terminate,
            Err(err) => {
                warn!(error = ?err, "failed to install SIGTERM handler");
                return ctrl_c.await;
            }
        };
        tokio::select! {
            () = ctrl_c => {}
            _ = terminate.recv() => info!("SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}
