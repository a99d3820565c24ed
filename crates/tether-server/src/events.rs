//! Observable server events.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

/// Identifier for an accepted connection, unique for the server's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Why a connection left the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvictReason {
    /// No ping within the staleness threshold.
    Stale { idle: Duration },
    /// The handler exited (peer closed, I/O or decode error).
    Disconnected,
    /// The server is shutting down.
    Shutdown,
}

impl fmt::Display for EvictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictReason::Stale { idle } => write!(f, "heartbeat missed for {} ms", idle.as_millis()),
            EvictReason::Disconnected => f.write_str("disconnected"),
            EvictReason::Shutdown => f.write_str("server shutdown"),
        }
    }
}

/// Events broadcast to `Server::subscribe` receivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A connection was accepted and registered.
    Accepted { id: ConnectionId, peer: SocketAddr },
    /// A ping was received and answered.
    Ping { id: ConnectionId },
    /// A non-heartbeat payload was received.
    Payload {
        id: ConnectionId,
        peer: SocketAddr,
        text: String,
    },
    /// A connection was removed from the registry and closed.
    Evicted {
        id: ConnectionId,
        peer: SocketAddr,
        reason: EvictReason,
    },
}
