//! The durable error log receives client-side connection failures.
//!
//! Lives in its own test binary because the global subscriber can only be
//! installed once per process.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use tokio::sync::broadcast;

use tether_client::{Client, ClientConfig, ClientEvent, DisconnectReason};
use tether_core::Error;
use tether_core::logging::{LogFormat, init_logging};
use tether_test_utils::{PeerMode, ScriptedServer, refused_addr, wait_until};

const WAIT: Duration = Duration::from_secs(5);

fn log_path() -> &'static Path {
    static LOG: OnceLock<(tempfile::TempDir, PathBuf)> = OnceLock::new();
    let (_, path) = LOG.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.log");
        init_logging(0, Some(&path), LogFormat::Text).unwrap();
        (dir, path)
    });
    path
}

fn log_contents() -> String {
    std::fs::read_to_string(log_path()).unwrap_or_default()
}

async fn log_contains(needle: &str) -> bool {
    wait_until(WAIT, move || async move { log_contents().contains(needle) }).await
}

fn fast_config(addr: SocketAddr) -> ClientConfig {
    log_path();
    ClientConfig::new(addr.ip().to_string(), addr.port())
        .with_heartbeat_interval(Duration::from_millis(50))
        .with_receive_timeout(Duration::from_millis(100))
        .with_pong_timeout(Duration::from_millis(300))
        .with_send_timeout(Duration::from_millis(200))
        .with_connect_timeout(Duration::from_millis(500))
        .with_reconnect_backoff(Duration::from_millis(20))
        .with_watchdog_tick(Duration::from_millis(20))
}

async fn next_disconnect(events: &mut broadcast::Receiver<ClientEvent>) -> DisconnectReason {
    loop {
        let event = tokio::time::timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for disconnect")
            .expect("event channel closed");
        if let ClientEvent::Disconnected { reason } = event {
            return reason;
        }
    }
}

#[tokio::test]
async fn exhausted_retries_are_persisted() {
    let client = Client::new(fast_config(refused_addr()).with_reconnect_attempts(1));
    let err = tokio::time::timeout(WAIT, client.run())
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, Error::ReconnectExhausted { attempts: 1 }));

    assert!(log_contains("Connect failed").await);
    assert!(log_contains("Giving up on server").await);
    assert!(log_contains("maximum reconnect attempts (1) exceeded").await);
}

#[tokio::test]
async fn pong_timeout_is_persisted() {
    let server = ScriptedServer::start(PeerMode::Silent).await.unwrap();
    let client = Client::new(fast_config(server.addr()));
    let handle = client.handle();
    let mut events = handle.subscribe();
    let task = tokio::spawn(client.run());

    assert!(matches!(
        next_disconnect(&mut events).await,
        DisconnectReason::PongTimeout { .. }
    ));
    assert!(log_contains("Heartbeat timeout, dropping connection").await);

    handle.stop();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn server_close_is_persisted() {
    let server = ScriptedServer::start(PeerMode::Answer).await.unwrap();
    let client = Client::new(fast_config(server.addr()));
    let handle = client.handle();
    let mut events = handle.subscribe();
    let task = tokio::spawn(client.run());

    assert!(server.wait_for_pings(2, WAIT).await);
    server.kick_all();
    assert_eq!(next_disconnect(&mut events).await, DisconnectReason::PeerClosed);
    assert!(log_contains("Server closed the connection").await);
    assert!(log_contains("Connection lost").await);

    handle.stop();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap().unwrap();
}
