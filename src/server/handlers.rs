//! HTTP and WebSocket handlers
//!
//! | Path | Description |
//! |------|-------------|
//! | `/`, `/ingest` | Publisher WebSocket (`init` handshake, then binary media) |
//! | `/live/{id}` | Chunked stream of the publisher's bytes from offset 0 |
//! | `/video-url/{id}` | Attach URL for a known publisher |
//! | `/streams` | Addressable streams |
//! | `/health` | Liveness |
//! | `/stats` | Server counters |

use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{ConnectInfo, Path, State, WebSocketUpgrade};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use futures::{future, SinkExt, StreamExt};
use serde::Serialize;
use serde_json::json;
use tokio::sync::OwnedSemaphorePermit;

use crate::error::Error;
use crate::protocol::{IngestFrame, ServerMessage};
use crate::registry::{PublisherId, RegistryError};
use crate::session::{IngestSession, SessionContext, ViewerSession};
use crate::stats::ServerStats;

use super::error::ApiError;
use super::state::{live_url, AppState};

const CLOSE_NORMAL: u16 = 1000;
/// Rejected handshake or duplicate publisher
const CLOSE_POLICY: u16 = 1008;
/// Storage or other server-side failure
const CLOSE_INTERNAL: u16 = 1011;
/// Close reasons must fit in a control frame
const MAX_CLOSE_REASON: usize = 123;

/// Upgrade a publisher connection
pub async fn ingest(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let peer_addr = connect_info.map(|ConnectInfo(addr)| addr);

    let permit = match state.try_acquire_ingest() {
        Ok(permit) => permit,
        Err(_) => {
            tracing::warn!(peer = ?peer_addr, "Ingest rejected: limit reached");
            return ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "Too many publishers")
                .into_response();
        }
    };

    let ctx = state.new_session(peer_addr);
    let base_url = state.base_url(&headers);

    ws.on_upgrade(move |socket| run_ingest(socket, state, ctx, base_url, permit))
}

async fn run_ingest(
    socket: WebSocket,
    state: AppState,
    ctx: SessionContext,
    base_url: String,
    _permit: Option<OwnedSemaphorePermit>,
) {
    let (mut sink, stream) = socket.split();
    let mut frames = stream.filter_map(|msg| future::ready(to_ingest_frame(msg)));

    state.counters.ingest_opened();
    let mut session = IngestSession::new(
        ctx,
        Arc::clone(&state.registry),
        state.config.handshake_timeout,
    );

    let close = match session.handshake(&mut frames).await {
        Ok(handshake) => {
            let ready = ServerMessage::Ready {
                publisher_id: handshake.publisher_id.to_string(),
                url: live_url(&base_url, &handshake.publisher_id),
            };
            if let Err(e) = sink.send(Message::Text(ready.to_json())).await {
                tracing::debug!(publisher = %handshake.publisher_id, error = %e, "Failed to send ready");
            }

            match session.stream(&mut frames).await {
                Ok(_) => close_frame(CLOSE_NORMAL, String::new()),
                Err(e) => close_frame_for(&e),
            }
        }
        Err(e) => close_frame_for(&e),
    };

    state.counters.ingest_closed(session.stats());

    // The peer may already be gone
    let _ = sink.send(Message::Close(Some(close))).await;
}

fn to_ingest_frame(
    msg: Result<Message, axum::Error>,
) -> Option<Result<IngestFrame, axum::Error>> {
    match msg {
        Ok(Message::Text(text)) => Some(Ok(IngestFrame::Text(text))),
        Ok(Message::Binary(data)) => Some(Ok(IngestFrame::Binary(Bytes::from(data)))),
        Ok(Message::Close(_)) => Some(Ok(IngestFrame::Close)),
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
        Err(e) => Some(Err(e)),
    }
}

fn close_frame_for(err: &Error) -> CloseFrame<'static> {
    let code = match err {
        Error::Handshake(_)
        | Error::Registry(RegistryError::AlreadyPublishing(_))
        | Error::Registry(RegistryError::InvalidPublisherId(_)) => CLOSE_POLICY,
        _ => CLOSE_INTERNAL,
    };
    close_frame(code, err.to_string())
}

fn close_frame(code: u16, mut reason: String) -> CloseFrame<'static> {
    if reason.len() > MAX_CLOSE_REASON {
        let mut end = MAX_CLOSE_REASON;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason.truncate(end);
    }

    CloseFrame {
        code,
        reason: Cow::Owned(reason),
    }
}

/// Attach a viewer and stream the publisher's bytes from offset 0
///
/// Waits up to the grace period for a publisher that has not connected yet.
/// The response is chunked and ends when the publisher's log closes and the
/// viewer has drained it. A trailing `.{file_extension}` is accepted.
pub async fn live(
    Path(segment): Path<String>,
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> Result<Response, ApiError> {
    let id = PublisherId::new(state.config.strip_extension(&segment))?;
    let ctx = state.new_session(connect_info.map(|ConnectInfo(addr)| addr));

    let viewer = ViewerSession::attach(ctx, &state.registry, &id, state.config.registry.grace_period)
        .await?
        .with_counters(Arc::clone(&state.counters));

    let content_type = HeaderValue::from_str(&state.config.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (header::ACCEPT_RANGES, HeaderValue::from_static("bytes")),
        ],
        Body::from_stream(viewer.into_body_stream()),
    )
        .into_response())
}

/// Response of `/video-url/{id}`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoUrl {
    pub publisher_id: String,
    pub url: String,
}

/// Attach URL for a known publisher
pub async fn video_url(
    Path(segment): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<VideoUrl>, ApiError> {
    let id = PublisherId::new(segment)?;
    state.registry.lookup(&id)?;

    Ok(Json(VideoUrl {
        url: state.attach_url(&headers, &id),
        publisher_id: id.to_string(),
    }))
}

/// One entry of `/streams`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEntry {
    pub publisher_id: String,
    pub title: Option<String>,
    pub live: bool,
    pub bytes: u64,
    pub viewers: u32,
    pub url: String,
}

/// List addressable streams
pub async fn list_streams(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<Vec<StreamEntry>> {
    let base_url = state.base_url(&headers);

    let entries = state
        .registry
        .list()
        .into_iter()
        .filter_map(|stats| {
            let id = PublisherId::new(stats.publisher_id.as_str()).ok()?;
            Some(StreamEntry {
                url: live_url(&base_url, &id),
                live: stats.is_live(),
                publisher_id: stats.publisher_id,
                title: stats.title,
                bytes: stats.bytes,
                viewers: stats.viewers,
            })
        })
        .collect();

    Json(entries)
}

/// Health check
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "streams": state.registry.stream_count(),
    }))
}

/// Server counters
pub async fn stats(State(state): State<AppState>) -> Json<ServerStats> {
    Json(state.stats())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_mapping() {
        assert_eq!(
            to_ingest_frame(Ok(Message::Text("{}".into()))).unwrap().unwrap(),
            IngestFrame::Text("{}".into())
        );
        assert_eq!(
            to_ingest_frame(Ok(Message::Binary(vec![1, 2]))).unwrap().unwrap(),
            IngestFrame::Binary(Bytes::from_static(&[1, 2]))
        );
        assert_eq!(
            to_ingest_frame(Ok(Message::Close(None))).unwrap().unwrap(),
            IngestFrame::Close
        );
        assert!(to_ingest_frame(Ok(Message::Ping(vec![]))).is_none());
    }

    #[test]
    fn test_close_codes() {
        let id = PublisherId::new("s1").unwrap();

        let err: Error = RegistryError::AlreadyPublishing(id).into();
        assert_eq!(close_frame_for(&err).code, CLOSE_POLICY);

        let err: Error = crate::protocol::HandshakeError::Timeout.into();
        assert_eq!(close_frame_for(&err).code, CLOSE_POLICY);

        let err: Error =
            crate::stream_log::LogError::Storage(std::io::Error::other("disk full")).into();
        assert_eq!(close_frame_for(&err).code, CLOSE_INTERNAL);
    }

    #[test]
    fn test_close_reason_truncated_on_char_boundary() {
        let frame = close_frame(CLOSE_POLICY, "é".repeat(100));
        assert!(frame.reason.len() <= MAX_CLOSE_REASON);
        assert!(frame.reason.chars().all(|c| c == 'é'));
    }
}
