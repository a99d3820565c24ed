//! Tracing integration for structured logging.
//!
//! Provides logging setup for both client and server with:
//! - Configurable verbosity levels
//! - Text or JSON output on stderr for every event
//! - An optional append-only file that receives only error-level events,
//!   so connect failures and timeouts survive the process while routine
//!   connect/disconnect chatter stays on the console

use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::Result;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

/// Map a `-v` count to a level name.
fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Initialize the logging system.
///
/// # Arguments
///
/// * `verbosity` - Verbosity level (0=info, 1=debug, 2+=trace)
/// * `error_log` - Optional file that error-level events are appended to
/// * `format` - Output format (text or JSON)
///
/// # Example
///
/// ```ignore
/// use tether_core::logging::{init_logging, LogFormat};
///
/// // Info on stderr, errors also persisted to client.log
/// init_logging(0, Some(Path::new("client.log")), LogFormat::Text).unwrap();
/// ```
pub fn init_logging(verbosity: u8, error_log: Option<&Path>, format: LogFormat) -> Result<()> {
    let level = level_for(verbosity);

    // Build filter with level and allow RUST_LOG override
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "tether={},tether_core={},tether_client={},tether_server={}",
            level, level, level, level
        ))
    });

    let console: BoxedLayer = match format {
        LogFormat::Text => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(verbosity >= 3)
            .with_line_number(verbosity >= 3)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
    };

    let mut layers = vec![console];
    if let Some(path) = error_log {
        layers.push(error_file_layer(path, format)?);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| crate::Error::Io(std::io::Error::other(e.to_string())))?;

    Ok(())
}

/// Build the durable error-only layer, creating parent directories as needed.
fn error_file_layer(path: &Path, format: LogFormat) -> Result<BoxedLayer> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;

    let layer = match format {
        LogFormat::Text => fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(true)
            .with_filter(LevelFilter::ERROR)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(Mutex::new(file))
            .with_filter(LevelFilter::ERROR)
            .boxed(),
    };
    Ok(layer)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_default() {
        assert_eq!(LogFormat::default(), LogFormat::Text);
    }

    #[test]
    fn verbosity_mapping() {
        assert_eq!(level_for(0), "info");
        assert_eq!(level_for(1), "debug");
        assert_eq!(level_for(2), "trace");
        assert_eq!(level_for(9), "trace");
    }

    #[test]
    fn error_file_layer_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/logs/client.log");

        error_file_layer(&path, LogFormat::Text).unwrap();
        assert!(path.exists());
    }

    // Note: the global subscriber can only be installed once per process, so
    // end-to-end checks of the error-only file live in tests/logging.rs.
}
