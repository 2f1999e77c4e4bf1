//! live-relay: file-backed live video relay
//!
//! One publisher pushes an opaque media byte stream (typically WebM) over a
//! WebSocket; any number of viewers fetch it over chunked HTTP while it is
//! still being written. Every viewer reads from offset 0, so a stream whose
//! container header sits at the start stays decodable for late joiners.
//!
//! ```text
//!  Publisher ──ws──► IngestSession ──append──► StreamLog (file) ◄──read── ViewerSession ──http──► Viewer
//!                          │                        ▲                          │
//!                          └── LogRegistry ─────────┴──────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use live_relay::{RelayServer, ServerConfig};
//!
//! # async fn run() -> live_relay::Result<()> {
//! let config = ServerConfig::default().storage_dir("streams");
//! let server = RelayServer::new(config);
//! server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await
//! # }
//! ```

pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;
pub mod stream_log;

pub use error::{Error, Result};
pub use registry::{LogRegistry, PublisherId, RegistryConfig};
pub use server::{RelayServer, ServerConfig};
pub use session::{IngestSession, ViewerSession};
pub use stream_log::{LogReader, LogWriter, StreamLog};
