//! Session context
//!
//! Identity of one connection, carried into every log line it produces.

use std::net::SocketAddr;
use std::time::Instant;

/// Per-connection context shared by ingest and viewer sessions
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Unique session ID
    pub session_id: u64,

    /// Remote peer address, when the transport exposes one
    pub peer_addr: Option<SocketAddr>,

    /// When the connection was accepted
    pub connected_at: Instant,
}

impl SessionContext {
    /// Create a new context
    pub fn new(session_id: u64, peer_addr: Option<SocketAddr>) -> Self {
        Self {
            session_id,
            peer_addr,
            connected_at: Instant::now(),
        }
    }

    /// Peer address for logging
    pub fn peer(&self) -> String {
        self.peer_addr
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".to_string())
    }
}
