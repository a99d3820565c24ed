//! tether-core: Shared library for the tether liveness protocol.
//!
//! This crate provides:
//! - Wire token definitions (`ping`, `pong`, opaque payloads)
//! - Error types and timing constants
//! - A lock-free liveness clock shared by heartbeat workers
//! - Session status and reconnection policy
//! - Logging setup

pub mod constants;
pub mod error;
pub mod liveness;
pub mod logging;
pub mod protocol;
pub mod session;

pub use error::{Error, Result};
pub use liveness::LivenessClock;
pub use logging::{LogFormat, init_logging};
pub use protocol::{Token, TokenDecoder, decode_chunk};
