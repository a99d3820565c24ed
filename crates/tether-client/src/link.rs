//! One live connection to the server.
//!
//! A `Link` owns the write half of the socket and the connection's `active`
//! flag (the heartbeat gate). The receive loop owns the read half. Whichever
//! worker first notices a failure calls [`Link::disconnect`]; that flips the
//! flag exactly once, drops the write half, and every other worker sees the
//! flag change at its next suspension point and exits.

use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::watch;
use tracing::debug;

use tether_core::{Error, Result, Token};

use crate::events::DisconnectReason;

/// Shared handle to the current connection.
#[derive(Debug)]
pub struct Link {
    peer_addr: SocketAddr,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    active: watch::Sender<bool>,
    reason: Mutex<Option<DisconnectReason>>,
}

impl Link {
    /// Wrap the write half of a freshly connected socket. The link starts active.
    pub fn new(peer_addr: SocketAddr, writer: OwnedWriteHalf) -> Self {
        let (active, _) = watch::channel(true);
        Self {
            peer_addr,
            writer: tokio::sync::Mutex::new(Some(writer)),
            active,
            reason: Mutex::new(None),
        }
    }

    /// Server address of this connection.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Whether heartbeats should keep running on this connection.
    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    /// Resolve once the link has been disconnected.
    pub async fn wait_inactive(&self) {
        let mut rx = self.active.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|active| !*active).await;
    }

    /// Why the link was disconnected, once it has been.
    pub fn reason(&self) -> Option<DisconnectReason> {
        self.reason.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Drop the connection.
    ///
    /// Idempotent: only the first call records `reason` and returns true.
    pub fn disconnect(&self, reason: DisconnectReason) -> bool {
        {
            let mut slot = self.reason.lock().unwrap_or_else(|e| e.into_inner());
            if slot.is_some() {
                return false;
            }
            debug!(peer = %self.peer_addr, %reason, "Link disconnected");
            // Recorded before the flag flips so waiters always find a reason.
            *slot = Some(reason);
            self.active.send_replace(false);
        }

        // A sender mid-write holds the lock; it drops the half itself when it
        // sees the flag.
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
        true
    }

    /// Write one token, bounded by `timeout`.
    ///
    /// Fails with `ConnectionClosed` if the link is or becomes inactive.
    pub async fn send(&self, token: &Token, timeout: Duration) -> Result<()> {
        let mut guard = self.writer.lock().await;
        if !self.is_active() {
            guard.take();
            return Err(Error::ConnectionClosed);
        }
        let Some(writer) = guard.as_mut() else {
            return Err(Error::ConnectionClosed);
        };

        let bytes = token.encode();
        let result = tokio::select! {
            _ = self.wait_inactive() => Err(Error::ConnectionClosed),
            written = tokio::time::timeout(timeout, writer.write_all(&bytes)) => match written {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(Error::Io(e)),
                Err(_) => Err(Error::Timeout),
            },
        };

        if !self.is_active() {
            guard.take();
        }
        result
    }
}
