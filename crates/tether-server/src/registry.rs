//! Connection registry for tether-server.
//!
//! Tracks every active connection and the last time it sent a ping. A single
//! mutex guards all mutations; it is never held across an `.await`.
//!
//! Closing a connection is signalled, not performed, by the registry: each
//! record owns the sending half of a oneshot whose receiver sits in the
//! connection's handler. Only the caller that removes the record under the
//! lock gets to fire that signal, so a record is evicted at most once and a
//! late `touch` from the handler finds nothing to refresh.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info};

use crate::events::{ConnectionId, EvictReason, ServerEvent};

/// Capacity of the server event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Liveness record for one connection.
#[derive(Debug)]
struct LivenessRecord {
    peer_addr: SocketAddr,
    last_heartbeat: Instant,
    close_tx: oneshot::Sender<EvictReason>,
}

/// Point-in-time copy of a record, safe to inspect without the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSnapshot {
    pub id: ConnectionId,
    pub peer_addr: SocketAddr,
    /// Time since the last ping (or since registration).
    pub age: Duration,
}

/// Receiving half of a connection's close signal, held by its handler.
#[derive(Debug)]
pub struct CloseSignal {
    rx: oneshot::Receiver<EvictReason>,
}

impl CloseSignal {
    /// Wait until the registry evicts this connection.
    ///
    /// Resolves with `Shutdown` if the registry was dropped without evicting.
    pub async fn closed(&mut self) -> EvictReason {
        (&mut self.rx).await.unwrap_or(EvictReason::Shutdown)
    }

    /// Non-blocking check for a pending eviction.
    pub fn try_closed(&mut self) -> Option<EvictReason> {
        self.rx.try_recv().ok()
    }
}

// Recover the map even if a panicking thread poisoned the lock.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Registry of active connections keyed by [`ConnectionId`].
pub struct ConnectionRegistry {
    records: Mutex<HashMap<ConnectionId, LivenessRecord>>,
    next_id: AtomicU64,
    events_tx: broadcast::Sender<ServerEvent>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            records: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            events_tx,
        }
    }

    /// Register a newly accepted connection with the current timestamp.
    pub fn register(&self, peer_addr: SocketAddr) -> (ConnectionId, CloseSignal) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (close_tx, rx) = oneshot::channel();

        let count = {
            let mut records = lock(&self.records);
            records.insert(
                id,
                LivenessRecord {
                    peer_addr,
                    last_heartbeat: Instant::now(),
                    close_tx,
                },
            );
            records.len()
        };

        info!(%id, peer = %peer_addr, active = count, "New connection");
        self.emit(ServerEvent::Accepted {
            id,
            peer: peer_addr,
        });
        (id, CloseSignal { rx })
    }

    /// Refresh a connection's heartbeat timestamp.
    ///
    /// Returns false, changing nothing, if the connection is no longer
    /// registered (it may have been evicted concurrently).
    pub fn touch(&self, id: ConnectionId) -> bool {
        let mut records = lock(&self.records);
        match records.get_mut(&id) {
            Some(record) => {
                record.last_heartbeat = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Remove a connection and signal its handler to close the socket.
    ///
    /// Idempotent: only the call that actually removes the record returns true.
    pub fn evict(&self, id: ConnectionId, reason: EvictReason) -> bool {
        let removed = {
            let mut records = lock(&self.records);
            let removed = records.remove(&id);
            removed.map(|record| (record, records.len()))
        };

        match removed {
            Some((record, remaining)) => {
                self.finish_eviction(id, record, reason, remaining);
                true
            }
            None => false,
        }
    }

    /// Evict a connection only if it is still older than `threshold`.
    ///
    /// The age is re-checked under the lock, so a ping that lands between a
    /// monitor snapshot and this call keeps the connection alive.
    pub fn evict_if_stale(&self, id: ConnectionId, threshold: Duration) -> bool {
        let removed = {
            let mut records = lock(&self.records);
            let idle = match records.get(&id) {
                Some(record) => record.last_heartbeat.elapsed(),
                None => return false,
            };
            if idle <= threshold {
                return false;
            }
            let removed = records.remove(&id);
            removed.map(|record| (record, idle, records.len()))
        };

        match removed {
            Some((record, idle, remaining)) => {
                self.finish_eviction(id, record, EvictReason::Stale { idle }, remaining);
                true
            }
            None => false,
        }
    }

    /// Evict every connection. Returns how many were removed.
    pub fn evict_all(&self, reason: EvictReason) -> usize {
        let drained: Vec<_> = lock(&self.records).drain().collect();

        let count = drained.len();
        for (id, record) in drained {
            self.finish_eviction(id, record, reason.clone(), 0);
        }
        count
    }

    fn finish_eviction(
        &self,
        id: ConnectionId,
        record: LivenessRecord,
        reason: EvictReason,
        remaining: usize,
    ) {
        let peer = record.peer_addr;
        // Err means the handler already exited.
        let _ = record.close_tx.send(reason.clone());
        info!(%id, %peer, %reason, remaining, "Connection removed");
        self.emit(ServerEvent::Evicted { id, peer, reason });
    }

    /// Consistent copy of all records and their ages.
    pub fn snapshot(&self) -> Vec<RecordSnapshot> {
        let now = Instant::now();
        let records = lock(&self.records);
        records
            .iter()
            .map(|(id, record)| RecordSnapshot {
                id: *id,
                peer_addr: record.peer_addr,
                age: now.saturating_duration_since(record.last_heartbeat),
            })
            .collect()
    }

    /// Check whether a connection is registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        lock(&self.records).contains_key(&id)
    }

    /// Number of active connections.
    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    /// Check if there are no active connections.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribe to server events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events_tx.subscribe()
    }

    /// Publish an event; dropped silently when nobody is listening.
    pub(crate) fn emit(&self, event: ServerEvent) {
        if self.events_tx.send(event).is_err() {
            debug!("No event subscribers");
        }
    }
}
