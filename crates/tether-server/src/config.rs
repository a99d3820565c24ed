//! Server configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tether_core::constants::{
    DEFAULT_PORT, DEFAULT_STALE_THRESHOLD, MIN_LISTEN_BACKLOG, MONITOR_TICK, SERVER_WRITE_TIMEOUT,
};
use tether_core::{Error, Result};

/// Server configuration, immutable once the server is bound.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_addr: SocketAddr,
    /// Silence after which a connection is evicted.
    pub stale_threshold: Duration,
    /// Listen backlog.
    pub backlog: u32,
    /// How often the heartbeat monitor scans the registry.
    pub monitor_tick: Duration,
    /// Upper bound on writing a reply to a client.
    pub write_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            stale_threshold: DEFAULT_STALE_THRESHOLD,
            backlog: MIN_LISTEN_BACKLOG,
            monitor_tick: MONITOR_TICK,
            write_timeout: SERVER_WRITE_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bind address.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the staleness threshold.
    pub fn with_stale_threshold(mut self, threshold: Duration) -> Self {
        self.stale_threshold = threshold;
        self
    }

    /// Set the listen backlog.
    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Set the monitor scan interval.
    pub fn with_monitor_tick(mut self, tick: Duration) -> Self {
        self.monitor_tick = tick;
        self
    }

    /// Set the reply write timeout.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.stale_threshold.is_zero() {
            return Err(config_error("stale threshold must be greater than zero"));
        }
        if self.monitor_tick.is_zero() {
            return Err(config_error("monitor tick must be greater than zero"));
        }
        if self.write_timeout.is_zero() {
            return Err(config_error("write timeout must be greater than zero"));
        }
        if self.backlog < MIN_LISTEN_BACKLOG {
            return Err(config_error(format!(
                "listen backlog must be at least {MIN_LISTEN_BACKLOG}"
            )));
        }
        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> Error {
    Error::Config {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 54321);
        assert!(config.bind_addr.ip().is_unspecified());
        assert_eq!(config.stale_threshold, Duration::from_secs(10));
        assert_eq!(config.backlog, 5);
        assert_eq!(config.monitor_tick, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_overrides() {
        let config = ServerConfig::new()
            .with_bind_addr("127.0.0.1:0".parse().unwrap())
            .with_stale_threshold(Duration::from_millis(300))
            .with_monitor_tick(Duration::from_millis(50))
            .with_backlog(64);

        assert_eq!(config.bind_addr.port(), 0);
        assert_eq!(config.stale_threshold, Duration::from_millis(300));
        assert_eq!(config.monitor_tick, Duration::from_millis(50));
        assert_eq!(config.backlog, 64);
    }

    #[test]
    fn validate_rejects_small_backlog() {
        let err = ServerConfig::new().with_backlog(4).validate().unwrap_err();
        assert!(err.to_string().contains("at least 5"));
    }

    #[test]
    fn validate_rejects_zero_durations() {
        assert!(
            ServerConfig::new()
                .with_stale_threshold(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            ServerConfig::new()
                .with_monitor_tick(Duration::ZERO)
                .validate()
                .is_err()
        );
    }
}
