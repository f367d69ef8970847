//! Writer and connection state machines

use std::time::Duration;

use super::types::Timestamp;

/// Recording state of the dual-sink writer
///
/// `Idle → Writing → {Finished | Failed}`; a writing session returns to
/// `Idle` only through an explicit cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriterStatus {
    /// No session started, or the session was cancelled
    #[default]
    Idle,

    /// The container session is open and accepting samples
    Writing,

    /// The container reported an error; the file path is over
    Failed,

    /// Finalize was requested
    Finished,
}

impl WriterStatus {
    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &WriterStatus) -> bool {
        use WriterStatus::*;

        match (self, target) {
            (Idle, Writing) => true,
            (Idle, Failed) => true,
            (Writing, Finished) => true,
            (Writing, Failed) => true,
            (Writing, Idle) => true,

            // Terminal states
            (Finished, _) | (Failed, _) => false,

            (a, b) if a == b => true,
            _ => false,
        }
    }

    /// Get a human-readable description of this state
    pub fn description(&self) -> &'static str {
        match self {
            WriterStatus::Idle => "Idle",
            WriterStatus::Writing => "Writing",
            WriterStatus::Failed => "Failed",
            WriterStatus::Finished => "Finished",
        }
    }

    pub fn is_writing(&self) -> bool {
        matches!(self, WriterStatus::Writing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WriterStatus::Failed | WriterStatus::Finished)
    }
}

impl std::fmt::Display for WriterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Bookkeeping for one recording take
///
/// `starting_time` is set once, from the first sample accepted while the
/// writer is idle. `current_duration` is the distance from that anchor to the
/// latest routed sample and is never negative.
#[derive(Debug, Clone, Default)]
pub struct RecordingSession {
    pub starting_time: Option<Timestamp>,
    pub current_duration: Duration,
    pub status: WriterStatus,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move to `target`, returning false (and staying put) if the move is invalid
    pub fn transition(&mut self, target: WriterStatus) -> bool {
        if !self.status.can_transition_to(&target) {
            log::warn!("Invalid writer transition {} -> {}", self.status, target);
            return false;
        }
        self.status = target;
        true
    }

    /// Recompute the elapsed duration for a sample at `time`
    pub fn advance(&mut self, time: Timestamp) -> Duration {
        if let Some(start) = self.starting_time {
            self.current_duration = time.saturating_duration_since(start);
        }
        self.current_duration
    }
}

/// Connection lifecycle of the live stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl ConnectionState {
    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &ConnectionState) -> bool {
        use ConnectionState::*;

        match (self, target) {
            (Disconnected, Connecting) => true,
            (Connecting, Connected) => true,
            (Connecting, Failed) => true,
            (Connecting, Disconnected) => true,
            (Connected, Disconnected) => true,
            (Connected, Failed) => true,
            // An I/O error reconnects without going through Failed
            (Connected, Connecting) => true,
            (Failed, Connecting) => true,
            (Failed, Disconnected) => true,

            (a, b) if a == b => true,
            _ => false,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Failed => "Failed",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}
