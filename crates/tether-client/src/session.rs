//! Client session state shared by the supervisor, its workers and handles.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use tether_core::LivenessClock;
use tether_core::session::SessionStatus;

use crate::events::{ClientEvent, DisconnectReason};
use crate::link::Link;

/// Capacity of the client event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// State of one client across all its connections.
///
/// `running` spans the client's lifetime. The per-connection heartbeat gate
/// lives on the current [`Link`].
#[derive(Debug)]
pub struct SessionState {
    running: watch::Sender<bool>,
    status: watch::Sender<SessionStatus>,
    reconnect_count: AtomicU32,
    last_pong: LivenessClock,
    link: Mutex<Option<Arc<Link>>>,
    events: broadcast::Sender<ClientEvent>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    /// Create idle, not-running state.
    pub fn new() -> Self {
        let (running, _) = watch::channel(false);
        let (status, _) = watch::channel(SessionStatus::Idle);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            running,
            status,
            reconnect_count: AtomicU32::new(0),
            last_pong: LivenessClock::new(),
            link: Mutex::new(None),
            events,
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Whether the client should keep (re)connecting.
    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.send_replace(running);
    }

    /// Resolve once `running` is false.
    pub async fn wait_stopped(&self) {
        let mut rx = self.running.subscribe();
        let _ = rx.wait_for(|running| !*running).await;
    }

    /// Clear `running` and drop the current connection.
    pub fn stop(&self) {
        self.set_running(false);
        // Stopped before `run` started: later `run` calls return immediately.
        // Otherwise the supervisor records the final status itself.
        let never_started = self.status.send_if_modified(|status| {
            if *status == SessionStatus::Idle {
                *status = SessionStatus::Stopped;
                true
            } else {
                false
            }
        });
        if never_started {
            self.emit(ClientEvent::Stopped);
        }
        if let Some(link) = self.current_link() {
            link.disconnect(DisconnectReason::Stopped);
        }
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Receiver for status changes.
    pub fn status_rx(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Move to `next` if the state machine allows it.
    pub(crate) fn transition(&self, next: SessionStatus) -> bool {
        let mut from = None;
        let moved = self.status.send_if_modified(|status| {
            if status.can_transition_to(next) {
                from = Some(*status);
                *status = next;
                true
            } else {
                false
            }
        });
        if let Some(from) = from {
            debug!(%from, to = %next, "Session status changed");
        }
        moved
    }

    /// Like [`transition`](Self::transition), but logs a refused move.
    pub(crate) fn expect_transition(&self, next: SessionStatus) {
        if !self.transition(next) {
            warn!(from = %self.status(), to = %next, "Unexpected session status change");
        }
    }

    // =========================================================================
    // Counters and clocks
    // =========================================================================

    /// Consecutive failed connects since the last success.
    pub fn reconnect_count(&self) -> u32 {
        self.reconnect_count.load(Ordering::SeqCst)
    }

    pub(crate) fn record_connect_failure(&self) -> u32 {
        self.reconnect_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn reset_reconnect_count(&self) {
        self.reconnect_count.store(0, Ordering::SeqCst);
    }

    /// Time of the last pong (or of the last successful connect).
    pub fn last_pong(&self) -> &LivenessClock {
        &self.last_pong
    }

    // =========================================================================
    // Connection
    // =========================================================================

    /// The live connection, if any.
    pub fn current_link(&self) -> Option<Arc<Link>> {
        lock(&self.link).clone()
    }

    /// Whether heartbeat workers are running on a live connection.
    pub fn heartbeat_active(&self) -> bool {
        self.current_link().is_some_and(|link| link.is_active())
    }

    pub(crate) fn attach_link(&self, link: Arc<Link>) {
        *lock(&self.link) = Some(link);
    }

    pub(crate) fn detach_link(&self) -> Option<Arc<Link>> {
        lock(&self.link).take()
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Subscribe to client events.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: ClientEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
