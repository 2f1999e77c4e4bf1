//! Registry error types
//!
//! Error types for log registry operations.

use std::io;

use thiserror::Error;

use super::key::PublisherId;

/// Error type for registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No log is registered for this publisher
    #[error("stream not found: {0}")]
    NotFound(PublisherId),

    /// Another ingest session holds the writer for this publisher
    #[error("stream already has a publisher: {0}")]
    AlreadyPublishing(PublisherId),

    /// Identifier failed validation
    #[error("invalid publisher id: {0:?}")]
    InvalidPublisherId(String),

    /// Storage for a new log could not be created
    #[error("failed to create stream storage: {0}")]
    Storage(#[from] io::Error),
}
