//! HTTP/WebSocket front end
//!
//! Adapts publisher WebSockets into [`IngestSession`](crate::session::IngestSession)s
//! and viewer requests into chunked responses fed by
//! [`ViewerSession`](crate::session::ViewerSession)s.

pub mod config;
pub mod error;
pub mod handlers;
pub mod listener;
pub mod router;
pub mod state;

pub use config::{ServerConfig, StorageKind};
pub use error::ApiError;
pub use listener::RelayServer;
pub use router::build_router;
pub use state::AppState;
