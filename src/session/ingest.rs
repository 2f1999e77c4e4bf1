//! Publisher ingest session
//!
//! Terminates one publisher connection: validates the `init` handshake,
//! claims the publisher's log from the registry, and appends every binary
//! frame to it in arrival order until the connection ends.
//!
//! The session is transport-agnostic. It consumes any stream of
//! [`IngestFrame`]s; the server adapts WebSocket messages into that shape.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};

use crate::error::{Error, Result};
use crate::protocol::{parse_init, ClientMessage, Handshake, HandshakeError, IngestFrame};
use crate::registry::{LogRegistry, PublisherId};
use crate::stats::SessionStats;
use crate::stream_log::LogWriter;

use super::context::SessionContext;
use super::state::{IngestPhase, IngestState};

/// Why a streaming session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed the connection
    TransportClosed,
    /// Transport failed
    TransportError(String),
    /// Publisher sent `{"type":"stop"}`
    Stop,
}

/// Summary of a completed ingest session
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// Stream that was published
    pub publisher_id: PublisherId,
    /// How the session ended
    pub reason: CloseReason,
    /// Session counters
    pub stats: SessionStats,
}

/// One publisher connection
pub struct IngestSession {
    ctx: SessionContext,
    registry: Arc<LogRegistry>,
    handshake_timeout: Duration,
    state: IngestState,
    writer: Option<LogWriter>,
    stats: SessionStats,
}

impl IngestSession {
    /// Create a session for an accepted connection
    pub fn new(ctx: SessionContext, registry: Arc<LogRegistry>, handshake_timeout: Duration) -> Self {
        Self {
            ctx,
            registry,
            handshake_timeout,
            state: IngestState::new(),
            writer: None,
            stats: SessionStats::new(),
        }
    }

    /// Current phase
    pub fn phase(&self) -> IngestPhase {
        self.state.phase
    }

    /// Publisher bound during the handshake
    pub fn publisher_id(&self) -> Option<&PublisherId> {
        self.writer.as_ref().map(|w| w.log().id())
    }

    /// Session counters so far
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Run the whole session: handshake, then stream until the end
    pub async fn run<S, E>(mut self, mut frames: S) -> Result<IngestOutcome>
    where
        S: Stream<Item = std::result::Result<IngestFrame, E>> + Unpin,
        E: Display,
    {
        let handshake = self.handshake(&mut frames).await?;
        let reason = self.stream(&mut frames).await?;

        Ok(IngestOutcome {
            publisher_id: handshake.publisher_id,
            reason,
            stats: self.stats.clone(),
        })
    }

    /// Read and validate the first message and claim the publisher's log
    ///
    /// On any failure the session is closed and nothing stays registered.
    pub async fn handshake<S, E>(&mut self, frames: &mut S) -> Result<Handshake>
    where
        S: Stream<Item = std::result::Result<IngestFrame, E>> + Unpin,
        E: Display,
    {
        self.state.start_handshake();

        let result = self.try_handshake(frames).await;
        if let Err(ref e) = result {
            tracing::warn!(
                session_id = self.ctx.session_id,
                peer = %self.ctx.peer(),
                error = %e,
                "Ingest handshake failed"
            );
            self.close();
        }
        result
    }

    async fn try_handshake<S, E>(&mut self, frames: &mut S) -> Result<Handshake>
    where
        S: Stream<Item = std::result::Result<IngestFrame, E>> + Unpin,
        E: Display,
    {
        let first = match tokio::time::timeout(self.handshake_timeout, frames.next()).await {
            Err(_) => return Err(HandshakeError::Timeout.into()),
            Ok(None) => return Err(HandshakeError::ConnectionClosed.into()),
            Ok(Some(Err(e))) => return Err(Error::Transport(e.to_string())),
            Ok(Some(Ok(frame))) => frame,
        };

        let handshake = parse_init(first)?;
        let writer = self
            .registry
            .lookup_or_create(&handshake.publisher_id, handshake.title.clone())
            .await?;

        self.writer = Some(writer);
        self.state.complete_handshake();

        tracing::info!(
            session_id = self.ctx.session_id,
            peer = %self.ctx.peer(),
            publisher = %handshake.publisher_id,
            title = handshake.title.as_deref().unwrap_or(""),
            "Publisher connected"
        );

        Ok(handshake)
    }

    /// Append binary frames until the connection ends or the publisher stops
    ///
    /// A storage failure ends the session with an error; the log has
    /// already been closed so viewers drain and finish.
    pub async fn stream<S, E>(&mut self, frames: &mut S) -> Result<CloseReason>
    where
        S: Stream<Item = std::result::Result<IngestFrame, E>> + Unpin,
        E: Display,
    {
        if !self.state.is_streaming() {
            return Err(Error::Transport(format!(
                "cannot stream in phase {:?}",
                self.state.phase
            )));
        }

        let result = self.pump(frames).await;
        self.close();
        result
    }

    async fn pump<S, E>(&mut self, frames: &mut S) -> Result<CloseReason>
    where
        S: Stream<Item = std::result::Result<IngestFrame, E>> + Unpin,
        E: Display,
    {
        let Some(writer) = self.writer.as_mut() else {
            return Err(Error::Transport("no writer bound".into()));
        };

        loop {
            let frame = match frames.next().await {
                None => return Ok(CloseReason::TransportClosed),
                Some(Err(e)) => {
                    tracing::warn!(
                        session_id = self.ctx.session_id,
                        publisher = %writer.log().id(),
                        error = %e,
                        "Ingest transport error"
                    );
                    return Ok(CloseReason::TransportError(e.to_string()));
                }
                Some(Ok(frame)) => frame,
            };

            match frame {
                IngestFrame::Binary(data) => {
                    writer.append(&data).await?;
                    self.stats.on_chunk_received(data.len());
                }
                IngestFrame::Text(text) => match ClientMessage::parse(&text) {
                    Ok(ClientMessage::Stop) => return Ok(CloseReason::Stop),
                    _ => {
                        self.stats.ignored_messages += 1;
                        tracing::debug!(
                            session_id = self.ctx.session_id,
                            publisher = %writer.log().id(),
                            len = text.len(),
                            "Ignoring text frame while streaming"
                        );
                    }
                },
                IngestFrame::Close => return Ok(CloseReason::TransportClosed),
            }
        }
    }

    /// Close the session and release the writer. Idempotent.
    pub fn close(&mut self) {
        if let Some(writer) = self.writer.take() {
            self.registry.release(writer);
        }

        if !self.state.is_closed() {
            self.state.close();
            self.stats.duration = self.state.duration();
            self.stats.calculate_bitrate();

            tracing::info!(
                session_id = self.ctx.session_id,
                chunks = self.stats.chunks_received,
                bytes = self.stats.bytes_received,
                ignored = self.stats.ignored_messages,
                duration_ms = self.stats.duration.as_millis() as u64,
                "Ingest session closed"
            );
        }
    }
}

impl Drop for IngestSession {
    fn drop(&mut self) {
        self.close();
    }
}
