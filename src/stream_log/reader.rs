//! Tail reader over a stream log

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use tokio::sync::watch;

use super::error::LogError;
use super::storage::StorageReader;
use super::stream::{LogState, StreamLog};

/// Independent read cursor into a [`StreamLog`]
///
/// Yields committed bytes in order, suspending while caught up with the
/// writer and ending once the log is closed and fully drained. Readers
/// never mutate log state and never touch the writer's storage handle.
pub struct LogReader {
    log: Arc<StreamLog>,
    offset: u64,
    state: watch::Receiver<LogState>,
    source: Box<dyn StorageReader>,
    chunk_size: usize,
}

impl LogReader {
    pub(super) fn new(
        log: Arc<StreamLog>,
        offset: u64,
        state: watch::Receiver<LogState>,
        source: Box<dyn StorageReader>,
        chunk_size: usize,
    ) -> Self {
        Self {
            log,
            offset,
            state,
            source,
            chunk_size,
        }
    }

    /// Current read offset
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// The log being read
    pub fn log(&self) -> &Arc<StreamLog> {
        &self.log
    }

    /// Next chunk of committed bytes
    ///
    /// Returns immediately if bytes are available below the write offset,
    /// otherwise waits for the next commit or close. `Ok(None)` means the
    /// log is closed and this reader has consumed everything in it.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, LogError> {
        loop {
            let state = *self.state.borrow_and_update();

            if self.offset < state.write_offset {
                let available = state.write_offset - self.offset;
                let len = available.min(self.chunk_size as u64) as usize;

                let chunk = self.source.read_at(self.offset, len).await?;
                self.offset += chunk.len() as u64;
                return Ok(Some(chunk));
            }

            if state.closed {
                return Ok(None);
            }

            // The sender lives as long as the log we hold, so this only
            // errors if the log itself is gone.
            if self.state.changed().await.is_err() {
                return Ok(None);
            }
        }
    }

    /// Convert into a byte stream suitable for an HTTP body
    ///
    /// The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = io::Result<Bytes>> + Send {
        futures::stream::unfold(Some(self), |reader| async move {
            let mut reader = reader?;
            match reader.next_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(reader))),
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!(
                        publisher = %reader.log.id(),
                        offset = reader.offset,
                        error = %e,
                        "Stream read failed"
                    );
                    Some((Err(e.into()), None))
                }
            }
        })
    }
}

impl Drop for LogReader {
    fn drop(&mut self) {
        self.log.detach_viewer();
    }
}

impl std::fmt::Debug for LogReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogReader")
            .field("publisher", self.log.id())
            .field("offset", &self.offset)
            .finish()
    }
}
