//! Handshake monitor: the "at most one transfer in flight" guard.
//!
//! ```text
//! Idle ──handshake──▶ HandshakeDetected ──dispatched──▶ Dispatched
//!  ▲                                                        │
//!  └────────────────────────completed───────────────────────┘
//! ```
//!
//! A handshake outside `Idle` is coalesced, never queued. There is no retry:
//! the next handshake from the device starts the next transfer.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    #[default]
    Idle,
    HandshakeDetected,
    Dispatched,
}

/// What the session should do with an incoming handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeDecision {
    /// Start a transfer now.
    Dispatch,
    /// A transfer is already under way; this handshake is dropped.
    Coalesced,
}

#[derive(Debug, Default)]
pub struct HandshakeMonitor {
    state: MonitorState,
    coalesced: u64,
    dispatched: u64,
}

impl HandshakeMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Handshakes dropped because a transfer was already in flight.
    pub fn coalesced(&self) -> u64 {
        self.coalesced
    }

    /// Transfers dispatched over the monitor's lifetime.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    pub fn on_handshake(&mut self) -> HandshakeDecision {
        match self.state {
            MonitorState::Idle => {
                self.state = MonitorState::HandshakeDetected;
                HandshakeDecision::Dispatch
            }
            MonitorState::HandshakeDetected | MonitorState::Dispatched => {
                self.coalesced += 1;
                tracing::warn!(
                    state = ?self.state,
                    coalesced = self.coalesced,
                    "coalesced handshake: transfer already in flight",
                );
                HandshakeDecision::Coalesced
            }
        }
    }

    /// The transfer for the detected handshake has been submitted.
    pub fn mark_dispatched(&mut self) {
        if self.state != MonitorState::HandshakeDetected {
            tracing::warn!(state = ?self.state, "dispatch without detected handshake ignored");
            return;
        }
        self.state = MonitorState::Dispatched;
        self.dispatched += 1;
    }

    /// The in-flight transfer finished, successfully or not.
    pub fn completed(&mut self) {
        if self.state != MonitorState::Dispatched {
            tracing::warn!(state = ?self.state, "completion without dispatched transfer ignored");
            return;
        }
        self.state = MonitorState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_cycle_returns_to_idle() {
        let mut monitor = HandshakeMonitor::new();
        assert_eq!(monitor.on_handshake(), HandshakeDecision::Dispatch);
        assert_eq!(monitor.state(), MonitorState::HandshakeDetected);
        monitor.mark_dispatched();
        assert_eq!(monitor.state(), MonitorState::Dispatched);
        monitor.completed();
        assert_eq!(monitor.state(), MonitorState::Idle);
        assert_eq!(monitor.dispatched(), 1);
    }

    #[test]
    fn handshake_while_dispatched_is_coalesced() {
        let mut monitor = HandshakeMonitor::new();
        monitor.on_handshake();
        monitor.mark_dispatched();

        assert_eq!(monitor.on_handshake(), HandshakeDecision::Coalesced);
        assert_eq!(monitor.on_handshake(), HandshakeDecision::Coalesced);
        assert_eq!(monitor.state(), MonitorState::Dispatched);
        assert_eq!(monitor.coalesced(), 2);
        assert_eq!(monitor.dispatched(), 1);
    }

    #[test]
    fn handshake_while_detected_is_coalesced() {
        let mut monitor = HandshakeMonitor::new();
        monitor.on_handshake();
        assert_eq!(monitor.on_handshake(), HandshakeDecision::Coalesced);
    }

    #[test]
    fn next_handshake_after_completion_dispatches_again() {
        let mut monitor = HandshakeMonitor::new();
        monitor.on_handshake();
        monitor.mark_dispatched();
        monitor.completed();
        assert_eq!(monitor.on_handshake(), HandshakeDecision::Dispatch);
    }

    #[test]
    fn stray_completion_is_ignored() {
        let mut monitor = HandshakeMonitor::new();
        monitor.completed();
        assert_eq!(monitor.state(), MonitorState::Idle);
    }
}
