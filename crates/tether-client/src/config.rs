//! Client configuration.

use std::time::Duration;

use tether_core::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HOST, DEFAULT_PONG_TIMEOUT,
    DEFAULT_PORT, DEFAULT_RECEIVE_TIMEOUT, DEFAULT_RECONNECT_BACKOFF, DEFAULT_SEND_TIMEOUT,
    WATCHDOG_TICK,
};
use tether_core::session::ReconnectionHandler;
use tether_core::{Error, Result};

/// Client configuration, shared read-only by every worker of a session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Consecutive failed connects tolerated before giving up (0 = unlimited).
    pub reconnect_attempts: u32,
    /// Interval between pings.
    pub heartbeat_interval: Duration,
    /// Upper bound on a single read before the receive loop re-checks its gates.
    pub receive_timeout: Duration,
    /// Silence after which the connection is considered dead.
    pub pong_timeout: Duration,
    /// Upper bound on writing a ping.
    pub send_timeout: Duration,
    /// Upper bound on establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Delay between failed connect attempts.
    pub reconnect_backoff: Duration,
    /// How often the watchdog checks for a missing pong.
    pub watchdog_tick: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            reconnect_attempts: 0,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            pong_timeout: DEFAULT_PONG_TIMEOUT,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
            watchdog_tick: WATCHDOG_TICK,
        }
    }
}

impl ClientConfig {
    /// Create a config targeting `host:port` with default timings.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Set the reconnect attempt limit (0 = unlimited).
    pub fn with_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect_attempts = attempts;
        self
    }

    /// Set the ping interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the read timeout.
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Set the pong timeout.
    pub fn with_pong_timeout(mut self, timeout: Duration) -> Self {
        self.pong_timeout = timeout;
        self
    }

    /// Set the ping write timeout.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the delay between failed connects.
    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    /// Set the watchdog check interval.
    pub fn with_watchdog_tick(mut self, tick: Duration) -> Self {
        self.watchdog_tick = tick;
        self
    }

    /// `host:port` string passed to the resolver.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Fresh reconnection policy for this config.
    pub fn reconnection_handler(&self) -> ReconnectionHandler {
        ReconnectionHandler::new(self.reconnect_attempts, self.reconnect_backoff)
    }

    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(config_error("host must not be empty"));
        }
        if self.port == 0 {
            return Err(config_error("port must be greater than zero"));
        }
        let durations = [
            ("heartbeat interval", self.heartbeat_interval),
            ("receive timeout", self.receive_timeout),
            ("pong timeout", self.pong_timeout),
            ("send timeout", self.send_timeout),
            ("connect timeout", self.connect_timeout),
            ("watchdog tick", self.watchdog_tick),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(config_error(format!("{name} must be greater than zero")));
            }
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
    use tether_core::session::RetryDecision;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 54321);
        assert_eq!(config.reconnect_attempts, 0);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(2));
        assert_eq!(config.receive_timeout, Duration::from_secs(5));
        assert_eq!(config.pong_timeout, Duration::from_secs(5));
        assert_eq!(config.send_timeout, Duration::from_secs(3));
        assert_eq!(config.reconnect_backoff, Duration::from_secs(2));
        assert_eq!(config.watchdog_tick, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_and_addr() {
        let config = ClientConfig::new("example.net", 7000)
            .with_reconnect_attempts(3)
            .with_pong_timeout(Duration::from_millis(400));
        assert_eq!(config.server_addr(), "example.net:7000");
        assert_eq!(config.reconnect_attempts, 3);
        assert_eq!(config.pong_timeout, Duration::from_millis(400));

        let mut policy = config.reconnection_handler();
        for _ in 0..3 {
            assert!(matches!(policy.record_failure(), RetryDecision::Retry { .. }));
        }
        assert_eq!(policy.record_failure(), RetryDecision::GiveUp { attempts: 3 });
    }

    #[test]
    fn zero_backoff_is_allowed() {
        let config = ClientConfig::default().with_reconnect_backoff(Duration::ZERO);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(ClientConfig::new("", 1).validate().is_err());
        assert!(ClientConfig::new("localhost", 0).validate().is_err());

        let err = ClientConfig::default()
            .with_heartbeat_interval(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("heartbeat interval"));
        assert!(err.is_fatal());
    }
}
