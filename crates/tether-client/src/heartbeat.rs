//! Heartbeat sender and pong watchdog.
//!
//! Both workers run once per connection and exit as soon as the link goes
//! inactive or the client stops. Either may be the one that detects the
//! failure; [`Link::disconnect`] makes the first detection win.

use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tracing::{debug, error, trace};

use tether_core::{Error, Token};

use crate::config::ClientConfig;
use crate::events::DisconnectReason;
use crate::link::Link;
use crate::session::SessionState;

/// Send `ping` every `heartbeat_interval` until the link drops.
pub async fn run_sender(link: Arc<Link>, config: Arc<ClientConfig>, state: Arc<SessionState>) {
    debug!(
        interval_ms = config.heartbeat_interval.as_millis() as u64,
        "Heartbeat sender started"
    );

    while state.is_running() && link.is_active() {
        match link.send(&Token::Ping, config.send_timeout).await {
            Ok(()) => trace!("Ping sent"),
            Err(Error::ConnectionClosed) => break,
            Err(e) => {
                error!(error = %e, "Failed to send heartbeat");
                link.disconnect(DisconnectReason::SendFailed(e.to_string()));
                break;
            }
        }

        tokio::select! {
            _ = link.wait_inactive() => break,
            _ = state.wait_stopped() => {
                link.disconnect(DisconnectReason::Stopped);
                break;
            }
            _ = tokio::time::sleep(config.heartbeat_interval) => {}
        }
    }

    debug!("Heartbeat sender stopped");
}

/// Drop the link once no pong has arrived for `pong_timeout`.
///
/// Checks every `watchdog_tick`, so detection lags the timeout by at most one
/// tick.
pub async fn run_watchdog(link: Arc<Link>, config: Arc<ClientConfig>, state: Arc<SessionState>) {
    let mut ticker = tokio::time::interval(config.watchdog_tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = link.wait_inactive() => break,
            _ = state.wait_stopped() => {
                link.disconnect(DisconnectReason::Stopped);
                break;
            }
            _ = ticker.tick() => {
                let last_pong = state.last_pong();
                if last_pong.is_expired(config.pong_timeout) {
                    let elapsed = last_pong.elapsed();
                    let err = Error::PongTimeout {
                        elapsed_ms: elapsed.as_millis() as u64,
                    };
                    error!(error = %err, "Heartbeat timeout, dropping connection");
                    link.disconnect(DisconnectReason::PongTimeout { elapsed });
                    break;
                }
            }
        }
    }

    debug!("Pong watchdog stopped");
}
