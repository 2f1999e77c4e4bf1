//! Append-only stream logs
//!
//! A [`StreamLog`] is the durable byte log behind one live stream. Exactly one
//! [`LogWriter`] appends to it; any number of [`LogReader`]s tail it
//! independently, each with its own cursor.
//!
//! # Visibility
//!
//! ```text
//!            committed (immutable)          not yet visible
//!   ┌──────────────────────────────────┬─────────────────────┐
//!   │ 0                   write_offset │ in-flight append    │
//!   └──────────────────────────────────┴─────────────────────┘
//!        ▲            ▲
//!   reader A      reader B        (each reads below write_offset only)
//! ```
//!
//! The writer advances `write_offset` through a `tokio::sync::watch` channel
//! only after storage has accepted the bytes, so readers never see a partial
//! append. Closing the log (explicitly, on writer drop, or after a storage
//! failure) is published on the same channel, which wakes every suspended
//! reader so it can drain and observe end-of-stream.

pub mod error;
pub mod reader;
pub mod storage;
pub mod stream;
pub mod writer;

pub use error::LogError;
pub use reader::LogReader;
pub use storage::{
    FileBackend, FileStorage, LogStorage, MemoryBackend, MemoryStorage, StorageBackend,
    StorageReader, SyncMode,
};
pub use stream::{LogState, StreamLog};
pub use writer::LogWriter;
