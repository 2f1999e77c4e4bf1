//! Stream log state shared between the writer and its readers

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use tokio::sync::watch;

use crate::registry::PublisherId;
use crate::stats::StreamStats;

use super::error::LogError;
use super::reader::LogReader;
use super::storage::LogStorage;

/// Snapshot of a log's visible state
///
/// Published by the writer on every commit and on close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogState {
    /// Bytes committed so far; everything below this offset is immutable
    pub write_offset: u64,
    /// No further bytes will be committed
    pub closed: bool,
    /// The log was closed because storage failed
    pub failed: bool,
}

/// Set in `viewers` once the log has been destroyed; no reader may attach after
const DESTROYED: u32 = 1 << 31;

/// Append-only byte log backing one live stream
pub struct StreamLog {
    id: PublisherId,
    generation: u64,
    title: Option<String>,
    storage: Arc<dyn LogStorage>,
    state: watch::Sender<LogState>,
    read_chunk_size: usize,
    chunks: AtomicU64,
    viewers: AtomicU32,
    created_at: Instant,
    closed_at: OnceLock<Instant>,
}

impl StreamLog {
    /// Create an empty, open log over `storage`
    pub fn new(
        id: PublisherId,
        generation: u64,
        title: Option<String>,
        storage: Arc<dyn LogStorage>,
        read_chunk_size: usize,
    ) -> Self {
        let (state, _) = watch::channel(LogState::default());

        Self {
            id,
            generation,
            title,
            storage,
            state,
            read_chunk_size: read_chunk_size.max(1),
            chunks: AtomicU64::new(0),
            viewers: AtomicU32::new(0),
            created_at: Instant::now(),
            closed_at: OnceLock::new(),
        }
    }

    /// Publisher this log belongs to
    pub fn id(&self) -> &PublisherId {
        &self.id
    }

    /// Registry generation of this log instance
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Title announced in the publisher's handshake
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Current visible state
    pub fn state(&self) -> LogState {
        *self.state.borrow()
    }

    /// Bytes committed so far
    pub fn write_offset(&self) -> u64 {
        self.state.borrow().write_offset
    }

    /// Whether the log has been closed
    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    /// Number of readers currently attached
    pub fn viewer_count(&self) -> u32 {
        self.viewers.load(Ordering::Acquire) & !DESTROYED
    }

    /// Whether cleanup has destroyed this log
    pub fn is_destroyed(&self) -> bool {
        self.viewers.load(Ordering::Acquire) & DESTROYED != 0
    }

    /// When the log was closed, if it has been
    pub fn closed_at(&self) -> Option<Instant> {
        self.closed_at.get().copied()
    }

    /// Where the bytes live
    pub fn location(&self) -> String {
        self.storage.location()
    }

    /// Open a tail reader starting at `offset`
    ///
    /// The reader counts as an attached viewer until it is dropped. It is
    /// counted before storage is opened, so cleanup cannot destroy the log
    /// underneath it; a log that is already destroyed yields `Removed`.
    pub async fn read_from(self: &Arc<Self>, offset: u64) -> Result<LogReader, LogError> {
        self.viewers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                (v & DESTROYED == 0).then_some(v + 1)
            })
            .map_err(|_| LogError::Removed)?;

        let source = match self.storage.open_reader().await {
            Ok(source) => source,
            Err(e) => {
                self.detach_viewer();
                return Err(LogError::Storage(e));
            }
        };

        Ok(LogReader::new(
            Arc::clone(self),
            offset,
            self.state.subscribe(),
            source,
            self.read_chunk_size,
        ))
    }

    /// Close the log, waking every suspended reader. Idempotent.
    pub fn close(&self) {
        self.finish(false);
    }

    /// Snapshot statistics
    pub fn stats(&self) -> StreamStats {
        let state = self.state();
        StreamStats {
            publisher_id: self.id.to_string(),
            title: self.title.clone(),
            bytes: state.write_offset,
            chunks: self.chunks.load(Ordering::Relaxed),
            viewers: self.viewer_count(),
            closed: state.closed,
            failed: state.failed,
            age: self.created_at.elapsed(),
        }
    }

    /// Release the underlying storage
    pub(crate) async fn remove_storage(&self) -> std::io::Result<()> {
        self.storage.remove().await
    }

    pub(super) fn storage(&self) -> &Arc<dyn LogStorage> {
        &self.storage
    }

    /// Publish a commit. Only the bound writer calls this.
    pub(super) fn commit(&self, len: u64) -> u64 {
        let mut new_offset = 0;
        self.state.send_modify(|s| {
            s.write_offset += len;
            new_offset = s.write_offset;
        });
        self.chunks.fetch_add(1, Ordering::Relaxed);
        new_offset
    }

    /// Close after a storage failure
    pub(super) fn fail(&self) {
        self.finish(true);
    }

    pub(super) fn detach_viewer(&self) {
        self.viewers.fetch_sub(1, Ordering::AcqRel);
    }

    /// Mark the log destroyed if no reader is attached
    ///
    /// Returns `false` when a reader holds it; the caller must then leave
    /// the log and its storage alone.
    pub(crate) fn try_destroy(&self) -> bool {
        self.viewers
            .compare_exchange(0, DESTROYED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn finish(&self, failed: bool) {
        let changed = self.state.send_if_modified(|s| {
            if s.closed {
                return false;
            }
            s.closed = true;
            s.failed = failed;
            true
        });

        if changed {
            let _ = self.closed_at.set(Instant::now());
            let state = self.state();
            tracing::info!(
                publisher = %self.id,
                generation = self.generation,
                bytes = state.write_offset,
                viewers = self.viewer_count(),
                failed = failed,
                "Stream log closed"
            );
        }
    }
}

impl std::fmt::Debug for StreamLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamLog")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .field("state", &self.state())
            .field("viewers", &self.viewer_count())
            .finish()
    }
}
