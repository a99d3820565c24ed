//! Session lifecycle types shared by client and server.
//!
//! This module provides:
//! - The client connection status state machine
//! - Fixed-backoff reconnection policy with optional attempt limit

mod reconnect;
mod state;

pub use reconnect::{ReconnectionHandler, RetryDecision};
pub use state::SessionStatus;
