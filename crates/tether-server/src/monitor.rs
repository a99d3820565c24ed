//! Heartbeat monitor: evicts connections that stopped pinging.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

use crate::registry::ConnectionRegistry;

/// Periodically scans the registry and evicts stale connections.
pub struct HeartbeatMonitor {
    registry: Arc<ConnectionRegistry>,
    stale_threshold: Duration,
    tick: Duration,
}

impl HeartbeatMonitor {
    /// Create a monitor over `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>, stale_threshold: Duration, tick: Duration) -> Self {
        Self {
            registry,
            stale_threshold,
            tick,
        }
    }

    /// Run one scan. Returns the number of connections evicted.
    pub fn sweep(&self) -> usize {
        let mut evicted = 0;
        for record in self.registry.snapshot() {
            if record.age <= self.stale_threshold {
                continue;
            }
            // Re-checked under the lock in case a ping raced the snapshot.
            if self.registry.evict_if_stale(record.id, self.stale_threshold) {
                error!(
                    id = %record.id,
                    peer = %record.peer_addr,
                    idle_ms = record.age.as_millis() as u64,
                    "Heartbeat missed, connection evicted"
                );
                evicted += 1;
            }
        }
        evicted
    }

    /// Run the scan loop until `shutdown` becomes true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(
            threshold_ms = self.stale_threshold.as_millis() as u64,
            tick_ms = self.tick.as_millis() as u64,
            "Heartbeat monitor started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.sweep();
                }
            }
        }

        debug!("Heartbeat monitor stopped");
    }

    /// Spawn [`run`](Self::run) on the current runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
