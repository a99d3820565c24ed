//! Connection supervisor: the client's connect / heartbeat / reconnect cycle.
//!
//! `Idle → Connecting → Connected → Disconnected → (Connecting | Stopped)`.
//!
//! A failed connect is retried after the fixed backoff until the attempt
//! limit is exceeded. A connection that drops after being established is
//! retried immediately.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use tether_core::session::{RetryDecision, SessionStatus};
use tether_core::{Error, Result, Token, decode_chunk};

use crate::config::ClientConfig;
use crate::events::{ClientEvent, DisconnectReason};
use crate::heartbeat::{run_sender, run_watchdog};
use crate::link::Link;
use crate::receiver::run_receiver;
use crate::session::SessionState;

// =============================================================================
// Client
// =============================================================================

/// A tether client. Call [`run`](Self::run) to drive it, and use a
/// [`ClientHandle`] to observe or stop it from elsewhere.
pub struct Client {
    config: Arc<ClientConfig>,
    state: Arc<SessionState>,
}

impl Client {
    /// Create a client for `config`.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::new(SessionState::new()),
        }
    }

    /// Handle for stopping and observing this client.
    pub fn handle(&self) -> ClientHandle {
        ClientHandle {
            config: Arc::clone(&self.config),
            state: Arc::clone(&self.state),
        }
    }

    /// Run until stopped or out of reconnect attempts.
    ///
    /// Returns `Ok(())` after [`ClientHandle::stop`] and
    /// `Err(Error::ReconnectExhausted)` when the attempt limit is exceeded.
    pub async fn run(self) -> Result<()> {
        self.state.set_running(true);
        if !self.state.transition(SessionStatus::Connecting) {
            // Stopped before we started.
            self.state.set_running(false);
            return Ok(());
        }

        info!(
            server = %self.config.server_addr(),
            max_attempts = self.config.reconnect_attempts,
            "Client starting"
        );

        let result = self.supervise().await;

        self.state.set_running(false);
        self.state.expect_transition(SessionStatus::Stopped);
        self.state.emit(ClientEvent::Stopped);
        info!("Client stopped");
        result
    }

    async fn supervise(&self) -> Result<()> {
        let mut policy = self.config.reconnection_handler();

        // Status is `Connecting` on every pass through the loop.
        while self.state.is_running() {
            self.state.emit(ClientEvent::Connecting {
                attempt: policy.attempt() + 1,
            });

            let connected = tokio::select! {
                _ = self.state.wait_stopped() => break,
                connected = self.connect() => connected,
            };

            match connected {
                Ok(stream) => {
                    policy.reset();
                    self.state.reset_reconnect_count();
                    let reason = self.serve(stream).await;
                    self.state.emit(ClientEvent::Disconnected { reason });

                    if !self.state.is_running() {
                        break;
                    }
                    self.state.expect_transition(SessionStatus::Connecting);
                }
                Err(e) if !e.is_transient() => {
                    error!(error = %e, "Cannot connect to server");
                    return Err(e);
                }
                Err(e) => {
                    let count = self.state.record_connect_failure();
                    self.state.emit(ClientEvent::ConnectFailed {
                        reconnect_count: count,
                        error: e.to_string(),
                    });

                    match policy.record_failure() {
                        RetryDecision::GiveUp { attempts } => {
                            let err = Error::ReconnectExhausted { attempts };
                            error!(
                                error = %err,
                                last_error = %e,
                                retried_for_ms = policy.elapsed().as_millis() as u64,
                                "Giving up on server"
                            );
                            return Err(err);
                        }
                        RetryDecision::Retry { attempt, delay } => {
                            error!(
                                attempt,
                                error = %e,
                                retry_in_ms = delay.as_millis() as u64,
                                "Connect failed"
                            );
                            tokio::select! {
                                _ = self.state.wait_stopped() => break,
                                _ = tokio::time::sleep(delay) => {}
                            }
                            self.state.expect_transition(SessionStatus::Connecting);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// One TCP connect bounded by `connect_timeout`.
    async fn connect(&self) -> Result<TcpStream> {
        let addr = self.config.server_addr();
        debug!(server = %addr, "Connecting");
        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr.as_str()))
            .await
            .map_err(|_| Error::Timeout)??;
        Ok(stream)
    }

    /// Run the heartbeat workers on `stream` until the link drops.
    async fn serve(&self, stream: TcpStream) -> DisconnectReason {
        let peer = match stream.peer_addr() {
            Ok(peer) => peer,
            Err(e) => {
                // Connected but already reset.
                self.state.expect_transition(SessionStatus::Connected);
                self.state.expect_transition(SessionStatus::Disconnected);
                return DisconnectReason::ReceiveFailed(e.to_string());
            }
        };
        let (reader, writer) = stream.into_split();
        let link = Arc::new(Link::new(peer, writer));

        self.state.last_pong().touch();
        self.state.attach_link(Arc::clone(&link));
        self.state.expect_transition(SessionStatus::Connected);
        info!(server = %peer, "Connected");
        self.state.emit(ClientEvent::Connected { peer });

        let workers = self.spawn_workers(reader, &link);

        // A stop that raced the attach above never saw this link.
        if !self.state.is_running() {
            link.disconnect(DisconnectReason::Stopped);
        }

        link.wait_inactive().await;
        self.state.detach_link();
        self.state.expect_transition(SessionStatus::Disconnected);

        let reason = link.reason().unwrap_or(DisconnectReason::Stopped);
        if reason == DisconnectReason::Stopped {
            info!(server = %peer, "Disconnected");
        } else {
            error!(server = %peer, %reason, "Connection lost");
        }

        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Heartbeat worker panicked");
            }
        }
        reason
    }

    fn spawn_workers(&self, reader: tokio::net::tcp::OwnedReadHalf, link: &Arc<Link>) -> [JoinHandle<()>; 3] {
        [
            tokio::spawn(run_sender(
                Arc::clone(link),
                Arc::clone(&self.config),
                Arc::clone(&self.state),
            )),
            tokio::spawn(run_watchdog(
                Arc::clone(link),
                Arc::clone(&self.config),
                Arc::clone(&self.state),
            )),
            tokio::spawn(run_receiver(
                reader,
                Arc::clone(link),
                Arc::clone(&self.config),
                Arc::clone(&self.state),
            )),
        ]
    }
}

// =============================================================================
// Client Handle
// =============================================================================

/// Cloneable handle to a running [`Client`].
#[derive(Debug, Clone)]
pub struct ClientHandle {
    config: Arc<ClientConfig>,
    state: Arc<SessionState>,
}

impl ClientHandle {
    /// Stop the client: no further reconnects, current connection dropped.
    ///
    /// Returns without waiting for the workers to exit.
    pub fn stop(&self) {
        if self.state.is_running() {
            info!("Stopping client");
        }
        self.state.stop();
    }

    /// Whether the client is still running.
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        self.state.status()
    }

    /// Consecutive failed connects since the last success.
    pub fn reconnect_count(&self) -> u32 {
        self.state.reconnect_count()
    }

    /// Whether heartbeats are currently running on a live connection.
    pub fn heartbeat_active(&self) -> bool {
        self.state.heartbeat_active()
    }

    /// Wait until the status equals `target`, up to `timeout`.
    ///
    /// Watches the latest status only, so short-lived states can be missed;
    /// use [`subscribe`](Self::subscribe) to see every transition.
    pub async fn wait_for_status(&self, target: SessionStatus, timeout: Duration) -> bool {
        let mut rx = self.state.status_rx();
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(|status| *status == target)).await,
            Ok(Ok(_))
        )
    }

    /// Subscribe to client events.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.state.subscribe()
    }

    /// Send an application payload on the current connection.
    ///
    /// Fails with `ConnectionClosed` when no connection is up. The text must
    /// be a single non-blank line that the server would not read as a
    /// heartbeat token; it is sent trimmed.
    pub async fn send(&self, text: &str) -> Result<()> {
        if text.contains(['\n', '\r']) {
            return Err(Error::Codec {
                message: "payload must be a single line".into(),
            });
        }
        let token = match decode_chunk(text.as_bytes())?.pop() {
            Some(Token::Payload(line)) => Token::Payload(line),
            Some(reserved) => {
                return Err(Error::Codec {
                    message: format!("{:?} is reserved for heartbeats", reserved.as_str()),
                });
            }
            None => {
                return Err(Error::Codec {
                    message: "payload is blank".into(),
                });
            }
        };
        let link = self.state.current_link().ok_or(Error::ConnectionClosed)?;
        link.send(&token, self.config.send_timeout).await
    }
}
