//! Per-connection read loop.
//!
//! A handler owns its `TcpStream` for the whole connection. It answers every
//! `ping` with `pong`, relays any other text to the log, and exits on peer
//! close, I/O or decode failure, eviction, or server shutdown. Whatever the
//! exit path, it evicts its own registry record once on the way out; that
//! call is a no-op when the monitor got there first.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, error, info};

use tether_core::constants::READ_BUFFER_SIZE;
use tether_core::{Error, Result, Token, TokenDecoder};

use crate::events::{ConnectionId, EvictReason, ServerEvent};
use crate::registry::{CloseSignal, ConnectionRegistry};

/// Why a handler's loop ended.
#[derive(Debug)]
pub enum HandlerExit {
    /// The registry evicted the connection.
    Evicted(EvictReason),
    /// The server is shutting down.
    Shutdown,
    /// The peer closed or the connection failed.
    Failed(Error),
}

/// Serves one accepted connection.
pub struct ConnectionHandler {
    id: ConnectionId,
    peer_addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    write_timeout: Duration,
}

impl ConnectionHandler {
    /// Create a handler for a connection already present in `registry`.
    pub fn new(
        id: ConnectionId,
        peer_addr: SocketAddr,
        registry: Arc<ConnectionRegistry>,
        write_timeout: Duration,
    ) -> Self {
        Self {
            id,
            peer_addr,
            registry,
            write_timeout,
        }
    }

    /// Serve the connection until it ends, then clean up its record.
    pub async fn run(
        self,
        mut stream: TcpStream,
        mut close: CloseSignal,
        mut shutdown: watch::Receiver<bool>,
    ) -> HandlerExit {
        let exit = self.serve(&mut stream, &mut close, &mut shutdown).await;

        match &exit {
            HandlerExit::Failed(Error::ConnectionClosed) => {
                info!(id = %self.id, peer = %self.peer_addr, "Client disconnected");
            }
            HandlerExit::Failed(e) => {
                error!(id = %self.id, peer = %self.peer_addr, error = %e, "Client handler error");
            }
            HandlerExit::Evicted(reason) => {
                debug!(id = %self.id, %reason, "Handler closing evicted connection");
            }
            HandlerExit::Shutdown => {
                debug!(id = %self.id, "Handler stopping for shutdown");
            }
        }

        self.registry.evict(self.id, EvictReason::Disconnected);
        drop(stream);
        exit
    }

    async fn serve(
        &self,
        stream: &mut TcpStream,
        close: &mut CloseSignal,
        shutdown: &mut watch::Receiver<bool>,
    ) -> HandlerExit {
        let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
        let mut decoder = TokenDecoder::new();

        loop {
            if *shutdown.borrow() {
                return HandlerExit::Shutdown;
            }
            buf.clear();

            tokio::select! {
                reason = close.closed() => return HandlerExit::Evicted(reason),
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return HandlerExit::Shutdown;
                    }
                }
                read = stream.read_buf(&mut buf) => match read {
                    Ok(0) => return HandlerExit::Failed(Error::ConnectionClosed),
                    Ok(_) => {
                        let handled = match decoder.decode(&buf) {
                            Ok(tokens) => self.handle_tokens(stream, tokens).await,
                            Err(e) => Err(e),
                        };
                        if let Err(e) = handled {
                            return HandlerExit::Failed(e);
                        }
                    }
                    Err(e) => return HandlerExit::Failed(e.into()),
                },
            }
        }
    }

    async fn handle_tokens(&self, stream: &mut TcpStream, tokens: Vec<Token>) -> Result<()> {
        for token in tokens {
            match token {
                Token::Ping => {
                    // The record may be gone already; the reply is still harmless.
                    self.registry.touch(self.id);
                    self.write_token(stream, &Token::Pong).await?;
                    self.registry.emit(ServerEvent::Ping { id: self.id });
                }
                other => {
                    let text = other.as_str().to_string();
                    info!(peer = %self.peer_addr, payload = %text, "Client message");
                    self.registry.emit(ServerEvent::Payload {
                        id: self.id,
                        peer: self.peer_addr,
                        text,
                    });
                }
            }
        }
        Ok(())
    }

    async fn write_token(&self, stream: &mut TcpStream, token: &Token) -> Result<()> {
        let bytes = token.encode();
        tokio::time::timeout(self.write_timeout, stream.write_all(&bytes))
            .await
            .map_err(|_| Error::Timeout)??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Accept one loopback connection and start a handler for it.
    async fn handler_pair(
        registry: &Arc<ConnectionRegistry>,
    ) -> (
        TcpStream,
        ConnectionId,
        watch::Sender<bool>,
        tokio::task::JoinHandle<HandlerExit>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (server_side, peer) = listener.accept().await.unwrap();

        let (id, close) = registry.register(peer);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handler = ConnectionHandler::new(id, peer, Arc::clone(registry), Duration::from_secs(1));
        let task = tokio::spawn(handler.run(server_side, close, shutdown_rx));
        (client, id, shutdown_tx, task)
    }

    async fn read_some(stream: &mut TcpStream) -> String {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
            .await
            .expect("read timed out")
            .unwrap();
        String::from_utf8(buf[..n].to_vec()).unwrap()
    }

    #[tokio::test]
    async fn ping_gets_exactly_one_pong() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (mut client, id, _shutdown, _task) = handler_pair(&registry).await;

        tokio::time::sleep(Duration::from_millis(30)).await;
        let before = registry.snapshot()[0].age;

        client.write_all(b"ping").await.unwrap();
        assert_eq!(read_some(&mut client).await, "pong\n");

        let after = registry.snapshot()[0].age;
        assert!(after < before);
        assert!(registry.contains(id));

        // Nothing else arrives.
        let mut buf = [0u8; 16];
        let extra = tokio::time::timeout(Duration::from_millis(100), client.read(&mut buf)).await;
        assert!(extra.is_err());
    }

    #[tokio::test]
    async fn payload_is_relayed_not_answered() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut events = registry.subscribe();
        let (mut client, id, _shutdown, _task) = handler_pair(&registry).await;

        client.write_all(b"hello server\n").await.unwrap();

        let event = loop {
            match tokio::time::timeout(Duration::from_secs(2), events.recv())
                .await
                .unwrap()
                .unwrap()
            {
                ServerEvent::Payload { id: got, text, .. } => break (got, text),
                _ => continue,
            }
        };
        assert_eq!(event, (id, "hello server".to_string()));
    }

    #[tokio::test]
    async fn ping_split_across_writes_is_one_ping() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut events = registry.subscribe();
        let (mut client, _id, _shutdown, _task) = handler_pair(&registry).await;

        client.write_all(b"ping\npi").await.unwrap();
        assert_eq!(read_some(&mut client).await, "pong\n");
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.write_all(b"ng\n").await.unwrap();
        assert_eq!(read_some(&mut client).await, "pong\n");

        let mut pings = 0;
        while pings < 2 {
            let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
                .await
                .unwrap()
                .unwrap();
            match event {
                ServerEvent::Ping { .. } => pings += 1,
                ServerEvent::Payload { text, .. } => panic!("unexpected payload {text:?}"),
                _ => {}
            }
        }
        assert_eq!(pings, 2);
    }

    #[tokio::test]
    async fn peer_close_removes_record() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (client, id, _shutdown, task) = handler_pair(&registry).await;

        drop(client);
        let exit = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(exit, HandlerExit::Failed(Error::ConnectionClosed)));
        assert!(!registry.contains(id));
    }

    #[tokio::test]
    async fn invalid_utf8_ends_connection() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (mut client, id, _shutdown, task) = handler_pair(&registry).await;

        client.write_all(&[0xff, 0xfe]).await.unwrap();
        let exit = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(exit, HandlerExit::Failed(Error::Codec { .. })));
        assert!(!registry.contains(id));
    }

    #[tokio::test]
    async fn eviction_closes_socket() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (mut client, id, _shutdown, task) = handler_pair(&registry).await;

        assert!(registry.evict(id, EvictReason::Stale { idle: Duration::from_secs(11) }));
        let exit = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(exit, HandlerExit::Evicted(EvictReason::Stale { .. })));

        // The handler dropped its end: the client reads EOF.
        assert_eq!(read_some(&mut client).await, "");
    }

    #[tokio::test]
    async fn shutdown_stops_handler() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (_client, id, shutdown, task) = handler_pair(&registry).await;

        shutdown.send(true).unwrap();
        let exit = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(exit, HandlerExit::Shutdown));
        assert!(!registry.contains(id));
    }
}
