//! Error types for live-relay
//!
//! Each layer has its own error type; [`Error`] wraps them for callers that
//! drive a whole session or the server.

use std::io;

use thiserror::Error;

use crate::protocol::HandshakeError;
use crate::registry::RegistryError;
use crate::stream_log::LogError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error outside of a stream log (bind, accept, config file)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Ingest handshake failed
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// Registry rejected or could not resolve a publisher
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Stream log storage failure
    #[error(transparent)]
    Log(#[from] LogError),

    /// Transport (WebSocket/HTTP) failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error originated in the writer's storage path
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Log(LogError::Storage(_)))
            || matches!(self, Error::Registry(RegistryError::Storage(_)))
    }
}
