//! tether-server: Server library for the tether liveness protocol.
//!
//! Provides:
//! - TCP listener with per-connection handlers
//! - Connection registry with idempotent eviction
//! - Heartbeat monitor for stale connections
//! - Server events for embedding and tests

pub mod cli;
pub mod config;
pub mod events;
pub mod handler;
pub mod listener;
pub mod monitor;
pub mod registry;

pub use cli::{Cli, CliLogFormat};
pub use config::ServerConfig;
pub use events::{ConnectionId, EvictReason, ServerEvent};
pub use handler::{ConnectionHandler, HandlerExit};
pub use listener::{Server, ShutdownHandle};
pub use monitor::HeartbeatMonitor;
pub use registry::{CloseSignal, ConnectionRegistry, RecordSnapshot};
