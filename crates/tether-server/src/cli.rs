//! Server CLI implementation.
//!
//! Provides command-line argument parsing for the tether server.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use tether_core::constants::{DEFAULT_PORT, MIN_LISTEN_BACKLOG};

use crate::config::ServerConfig;

/// Log output format for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CliLogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

impl From<CliLogFormat> for tether_core::LogFormat {
    fn from(fmt: CliLogFormat) -> Self {
        match fmt {
            CliLogFormat::Text => tether_core::LogFormat::Text,
            CliLogFormat::Json => tether_core::LogFormat::Json,
        }
    }
}

/// tether server - answers heartbeats and evicts silent clients.
#[derive(Debug, Parser)]
#[command(
    name = "tether-server",
    version,
    about = "tether server - answers heartbeats and evicts silent clients"
)]
pub struct Cli {
    /// Address to listen on
    #[arg(short = 'b', long = "bind", default_value = "0.0.0.0")]
    pub bind_addr: IpAddr,

    /// Port to listen on
    #[arg(short = 'p', long = "port", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Seconds without a ping before a client is evicted
    #[arg(
        long = "stale-threshold",
        default_value = "10",
        value_name = "SECONDS",
        env = "TETHER_STALE_THRESHOLD_SECS"
    )]
    pub stale_threshold_secs: u64,

    /// Listen backlog (minimum 5)
    #[arg(long = "backlog", default_value_t = MIN_LISTEN_BACKLOG)]
    pub backlog: u32,

    /// Heartbeat monitor scan interval in milliseconds
    #[arg(long = "monitor-tick-ms", default_value = "1000", value_name = "MS")]
    pub monitor_tick_ms: u64,

    /// Increase verbosity (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Append error-level events to this file
    #[arg(long = "log-file", value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Log output format
    #[arg(long = "log-format", default_value = "text")]
    pub log_format: CliLogFormat,
}

impl Cli {
    /// Get the socket address to bind to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    /// Build the server configuration from the parsed arguments.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::new()
            .with_bind_addr(self.socket_addr())
            .with_stale_threshold(Duration::from_secs(self.stale_threshold_secs))
            .with_backlog(self.backlog)
            .with_monitor_tick(Duration::from_millis(self.monitor_tick_ms))
    }
}

// =============================================================================
// Tests
// =============================================================================
