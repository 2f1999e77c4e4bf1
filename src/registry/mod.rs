//! Log registry for publisher/viewer routing
//!
//! The registry maps each publisher id to its [`StreamLog`](crate::stream_log::StreamLog)
//! and enforces the single-writer rule. It is injected into both the ingest
//! and the viewer paths; neither path keeps any other shared state.
//!
//! # Architecture
//!
//! ```text
//!                         Arc<LogRegistry>
//!                   ┌───────────────────────────┐
//!                   │ logs: HashMap<Id, Slot {  │
//!                   │   Pending | Ready(Arc<    │
//!                   │     StreamLog>)           │
//!                   │ }>                        │
//!                   │ created: watch::Sender    │
//!                   └─────────────┬─────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!    [IngestSession]        [ViewerSession]         [ViewerSession]
//!   lookup_or_create()        wait_for()              wait_for()
//!         │                       │                       │
//!   LogWriter::append ──► storage ◄── LogReader ─────── LogReader
//! ```
//!
//! # Lifetime
//!
//! A log is created when its publisher's handshake succeeds, closed when the
//! ingest session ends, and destroyed by the cleanup task once it has been
//! closed for the configured retention and no viewer is attached.

pub mod config;
pub mod entry;
pub mod error;
pub mod key;
pub mod store;

pub use config::{CreationWait, RegistryConfig};
pub use entry::SlotState;
pub use error::RegistryError;
pub use key::PublisherId;
pub use store::LogRegistry;
