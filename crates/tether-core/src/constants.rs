//! Protocol and timing constants for tether.

use std::time::Duration;

// =============================================================================
// Protocol Constants
// =============================================================================

/// Liveness probe sent by the client.
pub const PING: &str = "ping";

/// Liveness reply sent by the server.
pub const PONG: &str = "pong";

/// Size of a single socket read.
pub const READ_BUFFER_SIZE: usize = 1024;

/// Longest line held back while waiting for its newline.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 54321;

/// Default client target host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Minimum listen backlog.
pub const MIN_LISTEN_BACKLOG: u32 = 5;

// =============================================================================
// Server Timing Constants
// =============================================================================

/// Silence after which the server evicts a connection.
pub const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(10);

/// Heartbeat monitor scan interval.
pub const MONITOR_TICK: Duration = Duration::from_secs(1);

/// Upper bound on writing a pong back to a client.
pub const SERVER_WRITE_TIMEOUT: Duration = Duration::from_secs(3);

// =============================================================================
// Client Timing Constants
// =============================================================================

/// Interval between pings.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);

/// Upper bound on a single read before re-checking the session gates.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Silence after which the client drops the connection.
pub const DEFAULT_PONG_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on writing a single ping.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(3);

/// Upper bound on establishing a TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Fixed delay between failed connect attempts.
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// Pong watchdog polling interval.
pub const WATCHDOG_TICK: Duration = Duration::from_secs(1);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_timeout_is_shorter_than_receive_timeout() {
        assert!(DEFAULT_SEND_TIMEOUT < DEFAULT_RECEIVE_TIMEOUT);
    }

    #[test]
    fn heartbeat_fits_inside_liveness_windows() {
        assert!(DEFAULT_HEARTBEAT_INTERVAL < DEFAULT_PONG_TIMEOUT);
        assert!(DEFAULT_HEARTBEAT_INTERVAL < DEFAULT_STALE_THRESHOLD);
    }

    #[test]
    fn tokens_differ() {
        assert_ne!(PING, PONG);
    }
}
