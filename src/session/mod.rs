//! Ingest and viewer sessions
//!
//! An [`IngestSession`] owns one publisher connection and the exclusive
//! writer of its log. A [`ViewerSession`] owns one read cursor. Sessions
//! never talk to each other; they meet only in the
//! [`LogRegistry`](crate::registry::LogRegistry) and the log itself.

pub mod context;
pub mod ingest;
pub mod state;
pub mod viewer;

pub use context::SessionContext;
pub use ingest::{CloseReason, IngestOutcome, IngestSession};
pub use state::{IngestPhase, IngestState};
pub use viewer::ViewerSession;
