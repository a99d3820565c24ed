//! Client session status.

use std::fmt;

/// Connection status of a client session.
///
/// `Idle → Connecting → Connected → Disconnected → (Connecting | Stopped)`.
/// A failed connect goes `Connecting → Connecting` (after backoff) or
/// `Connecting → Stopped` when retries are exhausted or the client stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Not started yet.
    Idle,
    /// A connect attempt is in progress or about to start.
    Connecting,
    /// Connected; heartbeat workers are running.
    Connected,
    /// The connection just dropped.
    Disconnected,
    /// Terminal: stopped by the user or out of retries.
    Stopped,
}

impl SessionStatus {
    /// Check if this status allows moving to `next`.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Idle, Stopped)
                | (Connecting, Connecting)
                | (Connecting, Connected)
                | (Connecting, Stopped)
                | (Connected, Disconnected)
                | (Disconnected, Connecting)
                | (Disconnected, Stopped)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Connected => "connected",
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        use SessionStatus::*;
        assert!(Idle.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Disconnected));
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Disconnected.can_transition_to(Stopped));
    }

    #[test]
    fn stopped_is_terminal() {
        use SessionStatus::*;
        for next in [Idle, Connecting, Connected, Disconnected, Stopped] {
            assert!(!Stopped.can_transition_to(next));
        }
    }

    #[test]
    fn connected_cannot_skip_disconnect() {
        use SessionStatus::*;
        assert!(!Connected.can_transition_to(Connecting));
        assert!(!Connected.can_transition_to(Stopped));
        assert!(!Idle.can_transition_to(Connected));
    }

    #[test]
    fn display_names() {
        assert_eq!(SessionStatus::Connected.to_string(), "connected");
        assert_eq!(SessionStatus::Stopped.to_string(), "stopped");
    }
}
