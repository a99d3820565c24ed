//! tether-test-utils: Test infrastructure for tether.
//!
//! Provides:
//! - ScriptedServer: in-process peer that answers, ignores, or hangs up on pings
//! - RawPeer: bare TCP peer speaking the wire tokens directly
//! - Port and polling helpers

mod ports;
mod raw_peer;
mod scripted_server;

pub use ports::{refused_addr, wait_until};
pub use raw_peer::RawPeer;
pub use scripted_server::{PeerMode, ScriptedServer};
