//! In-process peer server with scripted heartbeat behaviour.
//!
//! Used to drive the client through its failure paths: a server that stops
//! answering pings, one that drops every connection, or one that kicks the
//! current connections on demand.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use tether_core::constants::READ_BUFFER_SIZE;
use tether_core::{Result, Token, TokenDecoder};

use crate::ports::wait_until;

/// How the scripted server treats its connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerMode {
    /// Answer every `ping` with `pong`.
    Answer,
    /// Keep connections open but never reply.
    Silent,
    /// Close every connection as soon as it is accepted.
    HangUp,
}

#[derive(Debug, Clone)]
enum Command {
    Kick,
    Send(String),
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicUsize,
    pings: AtomicUsize,
    payloads: Mutex<Vec<String>>,
}

/// A loopback server whose behaviour tests can change at runtime.
pub struct ScriptedServer {
    addr: SocketAddr,
    mode: Arc<watch::Sender<PeerMode>>,
    commands: broadcast::Sender<Command>,
    counters: Arc<Counters>,
    accept_task: JoinHandle<()>,
}

impl ScriptedServer {
    /// Bind an ephemeral loopback port and start accepting.
    pub async fn start(mode: PeerMode) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (mode_tx, _) = watch::channel(mode);
        let mode = Arc::new(mode_tx);
        let (commands, _) = broadcast::channel(16);
        let counters = Arc::new(Counters::default());

        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&mode),
            commands.clone(),
            Arc::clone(&counters),
        ));

        Ok(Self {
            addr,
            mode,
            commands,
            counters,
            accept_task,
        })
    }

    /// Address clients should connect to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Change behaviour for current and future connections.
    pub fn set_mode(&self, mode: PeerMode) {
        self.mode.send_replace(mode);
    }

    /// Close every open connection.
    pub fn kick_all(&self) {
        let _ = self.commands.send(Command::Kick);
    }

    /// Write `text` to every open connection.
    pub fn send_all(&self, text: &str) {
        let _ = self.commands.send(Command::Send(text.to_string()));
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.counters.accepted.load(Ordering::SeqCst)
    }

    /// Pings received so far.
    pub fn pings(&self) -> usize {
        self.counters.pings.load(Ordering::SeqCst)
    }

    /// Non-heartbeat payloads received so far.
    pub fn payloads(&self) -> Vec<String> {
        self.counters
            .payloads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Wait until at least `n` connections have been accepted.
    pub async fn wait_for_accepts(&self, n: usize, timeout: Duration) -> bool {
        let counters = Arc::clone(&self.counters);
        wait_until(timeout, move || {
            let counters = Arc::clone(&counters);
            async move { counters.accepted.load(Ordering::SeqCst) >= n }
        })
        .await
    }

    /// Wait until at least `n` pings have been received.
    pub async fn wait_for_pings(&self, n: usize, timeout: Duration) -> bool {
        let counters = Arc::clone(&self.counters);
        wait_until(timeout, move || {
            let counters = Arc::clone(&counters);
            async move { counters.pings.load(Ordering::SeqCst) >= n }
        })
        .await
    }
}

impl Drop for ScriptedServer {
    fn drop(&mut self) {
        self.kick_all();
        self.accept_task.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    mode: Arc<watch::Sender<PeerMode>>,
    commands: broadcast::Sender<Command>,
    counters: Arc<Counters>,
) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                debug!(error = %e, "Scripted server accept failed");
                continue;
            }
        };
        counters.accepted.fetch_add(1, Ordering::SeqCst);

        if *mode.borrow() == PeerMode::HangUp {
            debug!(%peer, "Scripted server hanging up");
            drop(stream);
            continue;
        }

        tokio::spawn(serve(
            stream,
            mode.subscribe(),
            commands.subscribe(),
            Arc::clone(&counters),
        ));
    }
}

async fn serve(
    mut stream: TcpStream,
    mode: watch::Receiver<PeerMode>,
    mut commands: broadcast::Receiver<Command>,
    counters: Arc<Counters>,
) {
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
    let mut decoder = TokenDecoder::new();

    loop {
        buf.clear();
        tokio::select! {
            command = commands.recv() => match command {
                Ok(Command::Send(text)) => {
                    if stream.write_all(text.as_bytes()).await.is_err() {
                        return;
                    }
                }
                // Kick, or the server itself is gone.
                Ok(Command::Kick) | Err(broadcast::error::RecvError::Closed) => return,
                Err(broadcast::error::RecvError::Lagged(_)) => {}
            },
            read = stream.read_buf(&mut buf) => {
                let Ok(n) = read else { return };
                if n == 0 {
                    return;
                }
                let Ok(tokens) = decoder.decode(&buf) else { return };
                for token in tokens {
                    match token {
                        Token::Ping => {
                            counters.pings.fetch_add(1, Ordering::SeqCst);
                            let current = *mode.borrow();
                            match current {
                                PeerMode::Answer => {
                                    if stream.write_all(&Token::Pong.encode()).await.is_err() {
                                        return;
                                    }
                                }
                                PeerMode::Silent => {}
                                PeerMode::HangUp => return,
                            }
                        }
                        other => counters
                            .payloads
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .push(other.as_str().to_string()),
                    }
                }
            }
        }
    }
}
