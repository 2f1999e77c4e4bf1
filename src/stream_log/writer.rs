//! Exclusive write handle

use std::sync::Arc;

use super::error::LogError;
use super::stream::StreamLog;

/// The single writer bound to a [`StreamLog`]
///
/// Only the registry hands these out, and only one per publisher at a time.
/// `append` takes `&mut self`, so a writer cannot race with itself either.
/// Dropping the writer closes the log.
#[derive(Debug)]
pub struct LogWriter {
    log: Arc<StreamLog>,
}

impl LogWriter {
    pub(crate) fn new(log: Arc<StreamLog>) -> Self {
        Self { log }
    }

    /// The log this writer appends to
    pub fn log(&self) -> &Arc<StreamLog> {
        &self.log
    }

    /// Append `bytes` and make them visible to readers
    ///
    /// Returns the new write offset. On storage failure the log is closed
    /// and nothing past the previous offset ever becomes readable.
    pub async fn append(&mut self, bytes: &[u8]) -> Result<u64, LogError> {
        let state = self.log.state();
        if state.closed {
            return Err(LogError::Closed);
        }
        if bytes.is_empty() {
            return Ok(state.write_offset);
        }

        if let Err(e) = self.log.storage().append(bytes).await {
            tracing::warn!(
                publisher = %self.log.id(),
                offset = state.write_offset,
                len = bytes.len(),
                error = %e,
                "Stream append failed, closing log"
            );
            self.log.fail();
            return Err(LogError::Storage(e));
        }

        let offset = self.log.commit(bytes.len() as u64);
        tracing::trace!(publisher = %self.log.id(), offset = offset, "Chunk committed");
        Ok(offset)
    }

    /// Close the log. Equivalent to dropping the writer.
    pub fn close(self) {
        self.log.close();
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        self.log.close();
    }
}
