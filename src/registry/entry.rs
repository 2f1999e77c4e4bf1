//! Registry slots
//!
//! This module defines the per-publisher state stored in the registry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::stream_log::StreamLog;

/// State of a publisher's slot, as reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Storage for a new log is being created; not yet readable
    Pending,
    /// A writer is bound and appending
    Publishing,
    /// The writer is gone; the log is readable until removed
    Closed,
}

/// Entry for a single publisher in the registry
#[derive(Debug)]
pub(super) enum Slot {
    /// Reserved by an in-flight `lookup_or_create`
    Pending { generation: u64 },
    /// Log exists and is addressable
    Ready(Arc<StreamLog>),
}

impl Slot {
    pub(super) fn state(&self) -> SlotState {
        match self {
            Slot::Pending { .. } => SlotState::Pending,
            Slot::Ready(log) if log.is_closed() => SlotState::Closed,
            Slot::Ready(_) => SlotState::Publishing,
        }
    }

    /// Whether a new writer may claim this slot
    pub(super) fn is_claimable(&self) -> bool {
        self.state() == SlotState::Closed
    }

    pub(super) fn log(&self) -> Option<&Arc<StreamLog>> {
        match self {
            Slot::Ready(log) => Some(log),
            Slot::Pending { .. } => None,
        }
    }
}

/// Whether a closed log has been drained and idle for at least `retention`
pub(super) fn is_expired(log: &StreamLog, retention: Duration, now: Instant) -> bool {
    match log.closed_at() {
        Some(closed_at) => {
            log.viewer_count() == 0 && now.saturating_duration_since(closed_at) >= retention
        }
        None => false,
    }
}
