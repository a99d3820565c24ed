//! Receive loop: reads server replies for one connection.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tracing::{debug, error, info, trace};

use tether_core::constants::READ_BUFFER_SIZE;
use tether_core::{Error, Result, Token, TokenDecoder};

use crate::config::ClientConfig;
use crate::events::{ClientEvent, DisconnectReason};
use crate::link::Link;
use crate::session::SessionState;

/// Read until the connection fails or the link drops, then disconnect.
///
/// A read that times out only re-checks the lifecycle gates. The link is
/// always disconnected on the way out; if another worker got there first
/// that call changes nothing.
pub async fn run_receiver(
    mut reader: OwnedReadHalf,
    link: Arc<Link>,
    config: Arc<ClientConfig>,
    state: Arc<SessionState>,
) {
    let reason = match receive(&mut reader, &link, &config, &state).await {
        Ok(()) => DisconnectReason::Stopped,
        Err(Error::ConnectionClosed) => {
            error!(peer = %link.peer_addr(), "Server closed the connection");
            DisconnectReason::PeerClosed
        }
        Err(e) => {
            error!(peer = %link.peer_addr(), error = %e, "Receive failed");
            DisconnectReason::ReceiveFailed(e.to_string())
        }
    };

    link.disconnect(reason);
    drop(reader);
    debug!("Receive loop stopped");
}

async fn receive(
    reader: &mut OwnedReadHalf,
    link: &Link,
    config: &ClientConfig,
    state: &SessionState,
) -> Result<()> {
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
    let mut decoder = TokenDecoder::new();

    while state.is_running() && link.is_active() {
        buf.clear();
        let read = tokio::select! {
            _ = link.wait_inactive() => return Ok(()),
            _ = state.wait_stopped() => return Ok(()),
            read = tokio::time::timeout(config.receive_timeout, reader.read_buf(&mut buf)) => read,
        };

        let n = match read {
            Err(_) => {
                trace!("Receive timeout, re-checking session");
                continue;
            }
            Ok(result) => result?,
        };
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }

        for token in decoder.decode(&buf)? {
            match token {
                Token::Pong => {
                    state.last_pong().touch();
                    trace!("Pong received");
                }
                Token::Ping => debug!("Ignoring ping from server"),
                Token::Payload(text) => {
                    info!(payload = %text, "Server message");
                    state.emit(ClientEvent::Payload(text));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};

    struct Fixture {
        link: Arc<Link>,
        state: Arc<SessionState>,
        server: TcpStream,
        task: tokio::task::JoinHandle<()>,
    }

    async fn start(receive_timeout: Duration) -> Fixture {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        let (read, write) = client.into_split();

        let link = Arc::new(Link::new(addr, write));
        let state = Arc::new(SessionState::new());
        state.set_running(true);
        let config = Arc::new(ClientConfig::default().with_receive_timeout(receive_timeout));
        let task = tokio::spawn(run_receiver(
            read,
            Arc::clone(&link),
            config,
            Arc::clone(&state),
        ));
        Fixture {
            link,
            state,
            server,
            task,
        }
    }

    #[tokio::test]
    async fn pong_refreshes_clock() {
        let mut f = start(Duration::from_secs(1)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(f.state.last_pong().elapsed() >= Duration::from_millis(50));

        f.server.write_all(b"pong\n").await.unwrap();
        let state = Arc::clone(&f.state);
        assert!(
            tether_test_utils::wait_until(Duration::from_secs(2), move || {
                let state = Arc::clone(&state);
                async move { state.last_pong().elapsed() < Duration::from_millis(50) }
            })
            .await
        );
        assert!(f.link.is_active());
    }

    #[tokio::test]
    async fn payload_is_emitted() {
        let mut f = start(Duration::from_secs(1)).await;
        let mut events = f.state.subscribe();

        f.server.write_all(b"hello client\n").await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, ClientEvent::Payload("hello client".into()));
    }

    #[tokio::test]
    async fn peer_close_disconnects() {
        let f = start(Duration::from_secs(1)).await;
        drop(f.server);

        tokio::time::timeout(Duration::from_secs(2), f.task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(f.link.reason(), Some(DisconnectReason::PeerClosed));
    }

    #[tokio::test]
    async fn read_timeout_keeps_connection() {
        let f = start(Duration::from_millis(20)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(f.link.is_active());

        f.state.stop();
        tokio::time::timeout(Duration::from_secs(2), f.task)
            .await
            .unwrap()
            .unwrap();
        assert!(!f.link.is_active());
    }

    #[tokio::test]
    async fn invalid_utf8_is_a_receive_failure() {
        let mut f = start(Duration::from_secs(1)).await;
        f.server.write_all(&[0xc3, 0x28]).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), f.task)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            f.link.reason(),
            Some(DisconnectReason::ReceiveFailed(_))
        ));
    }
}
