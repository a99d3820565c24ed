//! The durable error log receives server-side liveness failures.
//!
//! Lives in its own test binary because the global subscriber can only be
//! installed once per process.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use tether_core::logging::{LogFormat, init_logging};
use tether_server::{Server, ServerConfig};
use tether_test_utils::{RawPeer, wait_until};

const WAIT: Duration = Duration::from_secs(3);

fn log_path() -> &'static Path {
    static LOG: OnceLock<(tempfile::TempDir, PathBuf)> = OnceLock::new();
    let (_, path) = LOG.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.log");
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

async fn start(stale: Duration) -> (std::net::SocketAddr, tether_server::ShutdownHandle) {
    log_path();
    let config = ServerConfig::new()
        .with_bind_addr("127.0.0.1:0".parse().unwrap())
        .with_stale_threshold(stale)
        .with_monitor_tick(Duration::from_millis(25));
    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr();
    let shutdown = server.shutdown_handle();
    tokio::spawn(server.run());
    (addr, shutdown)
}

#[tokio::test]
async fn eviction_is_persisted() {
    let (addr, shutdown) = start(Duration::from_millis(100)).await;
    let mut peer = RawPeer::connect(addr).await.unwrap();

    assert!(peer.closed_within(WAIT).await);
    assert!(log_contains("Heartbeat missed, connection evicted").await);
    shutdown.shutdown();
}

#[tokio::test]
async fn decode_failure_is_persisted() {
    let (addr, shutdown) = start(Duration::from_secs(10)).await;
    let mut peer = RawPeer::connect(addr).await.unwrap();

    peer.send_raw(&[0xff, 0xfe]).await.unwrap();
    assert!(peer.closed_within(WAIT).await);
    assert!(log_contains("Client handler error").await);

    // Routine connection chatter stays on the console.
    assert!(!log_contents().contains(" INFO "));
    shutdown.shutdown();
}
