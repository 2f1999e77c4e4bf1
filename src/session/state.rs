//! Ingest session state machine
//!
//! ```text
//! Connecting ──► Handshaking ──► Streaming ──► Closed
//!                     │                          ▲
//!                     └──── protocol error ──────┘
//! ```

use std::time::{Duration, Instant};

/// Ingest session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestPhase {
    /// Transport accepted, nothing read yet
    Connecting,
    /// Waiting for the `init` message
    Handshaking,
    /// Writer bound; binary frames are appended
    Streaming,
    /// Terminal
    Closed,
}

/// Ingest session state
#[derive(Debug)]
pub struct IngestState {
    /// Current phase
    pub phase: IngestPhase,

    /// Connection start time
    pub connected_at: Instant,

    /// Time when the handshake completed
    pub handshake_completed_at: Option<Instant>,

    /// Time when the session closed
    pub closed_at: Option<Instant>,
}

impl IngestState {
    /// Create a new state in `Connecting`
    pub fn new() -> Self {
        Self {
            phase: IngestPhase::Connecting,
            connected_at: Instant::now(),
            handshake_completed_at: None,
            closed_at: None,
        }
    }

    /// Transition to handshaking phase
    pub fn start_handshake(&mut self) {
        if self.phase == IngestPhase::Connecting {
            self.phase = IngestPhase::Handshaking;
        }
    }

    /// Handshake accepted and writer bound
    pub fn complete_handshake(&mut self) {
        if self.phase == IngestPhase::Handshaking {
            self.phase = IngestPhase::Streaming;
            self.handshake_completed_at = Some(Instant::now());
        }
    }

    /// Close the session. Idempotent.
    pub fn close(&mut self) {
        if self.phase != IngestPhase::Closed {
            self.phase = IngestPhase::Closed;
            self.closed_at = Some(Instant::now());
        }
    }

    /// Check if the session is streaming
    pub fn is_streaming(&self) -> bool {
        self.phase == IngestPhase::Streaming
    }

    /// Check if the session is closed
    pub fn is_closed(&self) -> bool {
        self.phase == IngestPhase::Closed
    }

    /// Get session duration
    pub fn duration(&self) -> Duration {
        match self.closed_at {
            Some(closed_at) => closed_at.duration_since(self.connected_at),
            None => self.connected_at.elapsed(),
        }
    }
}

impl Default for IngestState {
    fn default() -> Self {
        Self::new()
    }
}
