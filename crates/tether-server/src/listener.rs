//! TCP listener and accept loop.
//!
//! `Server` binds the listening socket, owns the connection registry and the
//! heartbeat monitor, and spawns one [`ConnectionHandler`] per accepted
//! connection. Accepting never waits on a handler.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info};

use tether_core::{Error, Result};

use crate::config::ServerConfig;
use crate::events::{EvictReason, ServerEvent};
use crate::handler::ConnectionHandler;
use crate::monitor::HeartbeatMonitor;
use crate::registry::ConnectionRegistry;

/// Pause after a failed accept so a persistent error cannot spin the loop.
const ACCEPT_ERROR_PAUSE: Duration = Duration::from_millis(50);

// =============================================================================
// Shutdown Handle
// =============================================================================

/// Cloneable trigger for stopping a running server.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Ask the server to stop. Idempotent.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    /// Check whether shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

// =============================================================================
// Server
// =============================================================================

/// A bound tether server.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    config: ServerConfig,
    shutdown: ShutdownHandle,
}

impl Server {
    /// Bind the listening socket with address reuse and the configured backlog.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let addr = config.bind_addr;
        let bind_error = |source: std::io::Error| Error::Bind { addr, source };

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_error)?;
        socket.set_reuseaddr(true).map_err(bind_error)?;
        socket.bind(addr).map_err(bind_error)?;
        let listener = socket.listen(config.backlog).map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        let (tx, _) = watch::channel(false);
        Ok(Self {
            listener,
            local_addr,
            registry: Arc::new(ConnectionRegistry::new()),
            config,
            shutdown: ShutdownHandle { tx: Arc::new(tx) },
        })
    }

    /// Address the server is actually listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get a reference to the connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Subscribe to server events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.registry.subscribe()
    }

    /// Handle that stops [`run`](Self::run) from another task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Accept connections until shutdown, then close every remaining one.
    pub async fn run(self) -> Result<()> {
        info!(
            addr = %self.local_addr,
            stale_threshold_ms = self.config.stale_threshold.as_millis() as u64,
            backlog = self.config.backlog,
            "Server listening"
        );

        let monitor = HeartbeatMonitor::new(
            Arc::clone(&self.registry),
            self.config.stale_threshold,
            self.config.monitor_tick,
        )
        .spawn(self.shutdown.subscribe());

        self.accept_loop().await;

        let closed = self.registry.evict_all(EvictReason::Shutdown);
        if monitor.await.is_err() {
            error!("Heartbeat monitor task panicked");
        }
        info!(closed, "Server stopped");
        Ok(())
    }

    async fn accept_loop(&self) {
        let mut shutdown = self.shutdown.subscribe();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let accepted = tokio::select! {
                _ = shutdown.changed() => continue,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer_addr)) => self.spawn_handler(stream, peer_addr),
                Err(e) => {
                    if self.shutdown.is_shutdown() {
                        break;
                    }
                    error!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_PAUSE).await;
                }
            }
        }

        debug!("Accept loop finished");
    }

    fn spawn_handler(&self, stream: tokio::net::TcpStream, peer_addr: SocketAddr) {
        let (id, close) = self.registry.register(peer_addr);
        let handler = ConnectionHandler::new(
            id,
            peer_addr,
            Arc::clone(&self.registry),
            self.config.write_timeout,
        );
        tokio::spawn(handler.run(stream, close, self.shutdown.subscribe()));
    }
}
