//! Viewer session
//!
//! Tails one stream log from offset 0 and hands each chunk to the outbound
//! connection in order. Every viewer gets the full stream so far, so a
//! container whose header sits at the start of the stream stays playable
//! for late joiners.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::Result;
use crate::registry::{LogRegistry, PublisherId, RegistryError};
use crate::stats::{ServerCounters, SessionStats};
use crate::stream_log::{LogError, LogReader};

use super::context::SessionContext;

/// One viewer attached to a stream log
pub struct ViewerSession {
    ctx: SessionContext,
    reader: LogReader,
    stats: SessionStats,
    counters: Option<Arc<ServerCounters>>,
}

impl ViewerSession {
    /// Resolve `id`, waiting up to `grace` for the log to appear, and open a
    /// reader at offset 0
    pub async fn attach(
        ctx: SessionContext,
        registry: &LogRegistry,
        id: &PublisherId,
        grace: Duration,
    ) -> Result<Self> {
        let log = registry.wait_for(id, grace).await?;
        let reader = match log.read_from(0).await {
            // Destroyed by cleanup between lookup and attach
            Err(LogError::Removed) => return Err(RegistryError::NotFound(id.clone()).into()),
            result => result?,
        };

        tracing::info!(
            session_id = ctx.session_id,
            peer = %ctx.peer(),
            publisher = %id,
            available = log.write_offset(),
            viewers = log.viewer_count(),
            "Viewer attached"
        );

        Ok(Self {
            ctx,
            reader,
            stats: SessionStats::new(),
            counters: None,
        })
    }

    /// Report open/close to server-wide counters
    pub fn with_counters(mut self, counters: Arc<ServerCounters>) -> Self {
        counters.viewer_opened();
        self.counters = Some(counters);
        self
    }

    /// Publisher being watched
    pub fn publisher_id(&self) -> &PublisherId {
        self.reader.log().id()
    }

    /// Bytes delivered so far
    pub fn bytes_sent(&self) -> u64 {
        self.stats.bytes_sent
    }

    /// Next chunk to deliver; `None` once the log is closed and drained
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        let chunk = self.reader.next_chunk().await?;
        if let Some(ref chunk) = chunk {
            self.stats.on_chunk_sent(chunk.len());
        }
        Ok(chunk)
    }

    /// Copy the stream into `out` until end-of-stream or a write failure
    pub async fn pipe_to<W>(mut self, mut out: W) -> Result<SessionStats>
    where
        W: AsyncWrite + Unpin,
    {
        while let Some(chunk) = self.next_chunk().await? {
            if let Err(e) = out.write_all(&chunk).await {
                tracing::debug!(
                    session_id = self.ctx.session_id,
                    publisher = %self.publisher_id(),
                    error = %e,
                    "Viewer write failed"
                );
                return Err(e.into());
            }
            out.flush().await?;
        }

        self.finish();
        Ok(self.stats.clone())
    }

    /// Convert into a body stream; dropping the stream detaches the viewer
    pub fn into_body_stream(self) -> impl Stream<Item = io::Result<Bytes>> + Send {
        futures::stream::unfold(Some(self), |session| async move {
            let mut session = session?;
            match session.next_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(session))),
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!(
                        session_id = session.ctx.session_id,
                        publisher = %session.publisher_id(),
                        error = %e,
                        "Viewer stream failed"
                    );
                    Some((Err(io::Error::other(e.to_string())), None))
                }
            }
        })
    }

    fn finish(&mut self) {
        if let Some(counters) = self.counters.take() {
            counters.viewer_closed(&self.stats);
        }
    }
}

impl Drop for ViewerSession {
    fn drop(&mut self) {
        self.stats.duration = self.ctx.connected_at.elapsed();
        self.stats.calculate_bitrate();
        self.finish();

        tracing::info!(
            session_id = self.ctx.session_id,
            publisher = %self.reader.log().id(),
            bytes = self.stats.bytes_sent,
            offset = self.reader.offset(),
            duration_ms = self.stats.duration.as_millis() as u64,
            "Viewer detached"
        );
    }
}
