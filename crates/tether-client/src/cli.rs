//! Client CLI implementation.
//!
//! Provides command-line argument parsing for the tether client.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use tether_core::constants::{DEFAULT_HOST, DEFAULT_PORT};

use crate::config::ClientConfig;

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

/// tether - keep a heartbeat connection to a tether server alive.
#[derive(Debug, Parser)]
#[command(
    name = "tether",
    version,
    about = "tether - keep a heartbeat connection to a tether server alive"
)]
pub struct Cli {
    /// Server host name or address
    #[arg(default_value = DEFAULT_HOST)]
    pub host: String,

    /// Server port
    #[arg(short = 'p', long = "port", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Consecutive failed connects before giving up (0 = retry forever)
    #[arg(
        short = 'r',
        long = "reconnect-attempts",
        default_value = "0",
        value_name = "N",
        env = "TETHER_RECONNECT_ATTEMPTS"
    )]
    pub reconnect_attempts: u32,

    /// Seconds between pings
    #[arg(long = "heartbeat-interval", default_value = "2", value_name = "SECONDS", value_parser = parse_secs)]
    pub heartbeat_interval: Duration,

    /// Seconds a single read may block before re-checking the session
    #[arg(long = "receive-timeout", default_value = "5", value_name = "SECONDS", value_parser = parse_secs)]
    pub receive_timeout: Duration,

    /// Seconds without a pong before the connection is dropped
    #[arg(long = "pong-timeout", default_value = "5", value_name = "SECONDS", value_parser = parse_secs)]
    pub pong_timeout: Duration,

    /// Seconds allowed for writing a ping
    #[arg(long = "send-timeout", default_value = "3", value_name = "SECONDS", value_parser = parse_secs)]
    pub send_timeout: Duration,

    /// Seconds allowed for establishing the connection
    #[arg(long = "connect-timeout", default_value = "5", value_name = "SECONDS", value_parser = parse_secs)]
    pub connect_timeout: Duration,

    /// Seconds to wait after a failed connect
    #[arg(long = "reconnect-backoff", default_value = "2", value_name = "SECONDS", value_parser = parse_secs)]
    pub reconnect_backoff: Duration,

    /// Increase verbosity (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Append error-level events to this file
    #[arg(long = "log-file", value_name = "PATH", default_value = "client.log")]
    pub log_file: PathBuf,

    /// Log output format
    #[arg(long = "log-format", default_value = "text")]
    pub log_format: CliLogFormat,
}

impl Cli {
    /// Build the client configuration from the parsed arguments.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(self.host.clone(), self.port)
            .with_reconnect_attempts(self.reconnect_attempts)
            .with_heartbeat_interval(self.heartbeat_interval)
            .with_receive_timeout(self.receive_timeout)
            .with_pong_timeout(self.pong_timeout)
            .with_send_timeout(self.send_timeout)
            .with_connect_timeout(self.connect_timeout)
            .with_reconnect_backoff(self.reconnect_backoff)
    }
}

/// Parse fractional seconds, e.g. `2` or `0.5`.
fn parse_secs(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .parse()
        .map_err(|e| format!("invalid number of seconds: {}", e))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid duration: {}", e))
}

// =============================================================================
// Tests
// =============================================================================
