//! tether-client: Client library for the tether liveness protocol.
//!
//! Provides:
//! - CLI argument parsing
//! - Connection supervisor with bounded or unbounded reconnection
//! - Heartbeat sender, pong watchdog and receive loop
//! - Client handle and events for embedding and tests

pub mod cli;
pub mod config;
pub mod events;
pub mod heartbeat;
pub mod link;
pub mod receiver;
pub mod session;
pub mod supervisor;

pub use cli::{Cli, CliLogFormat};
pub use config::ClientConfig;
pub use events::{ClientEvent, DisconnectReason};
pub use link::Link;
pub use session::SessionState;
pub use supervisor::{Client, ClientHandle};
