//! Stream log error types

use std::io;

use thiserror::Error;

/// Error type for stream log operations
#[derive(Debug, Error)]
pub enum LogError {
    /// The storage layer failed; the log has been closed
    #[error("stream storage error: {0}")]
    Storage(#[from] io::Error),

    /// Append attempted on a closed log
    #[error("stream log is closed")]
    Closed,

    /// The log was destroyed by cleanup before the reader attached
    #[error("stream log has been removed")]
    Removed,
}

impl From<LogError> for io::Error {
    fn from(err: LogError) -> Self {
        match err {
            LogError::Storage(e) => e,
            LogError::Closed => io::Error::new(io::ErrorKind::BrokenPipe, "stream log is closed"),
            LogError::Removed => io::Error::new(io::ErrorKind::NotFound, "stream log has been removed"),
        }
    }
}
