//! Observable client events.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

/// Why a connection was dropped by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server closed the connection.
    PeerClosed,
    /// No pong within the pong timeout.
    PongTimeout { elapsed: Duration },
    /// Writing to the socket failed or timed out.
    SendFailed(String),
    /// Reading or decoding failed.
    ReceiveFailed(String),
    /// The client was stopped.
    Stopped,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::PeerClosed => f.write_str("server closed the connection"),
            DisconnectReason::PongTimeout { elapsed } => {
                write!(f, "no pong for {} ms", elapsed.as_millis())
            }
            DisconnectReason::SendFailed(e) => write!(f, "send failed: {e}"),
            DisconnectReason::ReceiveFailed(e) => write!(f, "receive failed: {e}"),
            DisconnectReason::Stopped => f.write_str("client stopped"),
        }
    }
}

/// Events broadcast to `ClientHandle::subscribe` receivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A connect attempt is starting. `attempt` counts from 1 within a run of failures.
    Connecting { attempt: u32 },
    /// The connection is up and heartbeats are running.
    Connected { peer: SocketAddr },
    /// A connect attempt failed; `reconnect_count` is the failure count so far.
    ConnectFailed { reconnect_count: u32, error: String },
    /// An established connection dropped.
    Disconnected { reason: DisconnectReason },
    /// The server sent something other than `pong`.
    Payload(String),
    /// The client has stopped for good.
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnect_reason_display() {
        let reason = DisconnectReason::PongTimeout {
            elapsed: Duration::from_millis(5_200),
        };
        assert_eq!(reason.to_string(), "no pong for 5200 ms");
        assert_eq!(
            DisconnectReason::PeerClosed.to_string(),
            "server closed the connection"
        );
    }
}
