//! Integration test for the durable error log.
//!
//! Lives in its own test binary because the global subscriber can only be
//! installed once per process.

use tether_core::logging::{LogFormat, init_logging};
use tracing::{error, info, warn};

#[test]
fn only_errors_reach_the_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("client.log");

    init_logging(0, Some(&path), LogFormat::Text).unwrap();

    info!("connected to server");
    warn!("pong is late");
    error!("connect failed: connection refused");

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("connect failed: connection refused"));
    assert!(!contents.contains("connected to server"));
    assert!(!contents.contains("pong is late"));

    // A second installation fails instead of silently replacing the first.
    assert!(init_logging(0, None, LogFormat::Text).is_err());
}
