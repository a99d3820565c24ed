//! Error types for tether.

use std::net::SocketAddr;

use thiserror::Error;

/// Main error type for tether operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from underlying socket calls.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed the connection (zero-length read).
    #[error("connection closed")]
    ConnectionClosed,

    /// A bounded socket operation did not finish in time.
    #[error("operation timed out")]
    Timeout,

    /// No pong arrived within the liveness window.
    #[error("no pong received for {elapsed_ms} ms")]
    PongTimeout { elapsed_ms: u64 },

    /// Received bytes could not be decoded as a token.
    #[error("codec error: {message}")]
    Codec { message: String },

    /// Invalid configuration value.
    #[error("invalid configuration: {message}")]
    Config { message: String },

    /// Server could not bind or listen.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Client gave up after too many consecutive connect failures.
    #[error("maximum reconnect attempts ({attempts}) exceeded")]
    ReconnectExhausted { attempts: u32 },
}

impl Error {
    /// Returns true if a disconnect + reconnect cycle may recover from this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::ConnectionClosed
                | Error::Timeout
                | Error::PongTimeout { .. }
                | Error::Codec { .. }
        )
    }

    /// Returns true if the process should stop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Bind { .. } | Error::ReconnectExhausted { .. } | Error::Config { .. }
        )
    }
}

/// Convenience result type for tether operations.
pub type Result<T> = std::result::Result<T, Error>;
