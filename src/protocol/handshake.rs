//! Ingest handshake
//!
//! The first frame on an ingest connection must be a JSON text message
//!
//! ```text
//! {"type": "init", "role": "publisher", "publisherId": <string>, "title"?: <string>}
//! ```
//!
//! Anything else ends the connection before a log is registered.

use thiserror::Error;

use super::message::{ClientMessage, IngestFrame, PUBLISHER_ROLE};
use crate::registry::PublisherId;

/// Error type for the ingest handshake
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    /// First message was not valid JSON of the expected shape
    #[error("malformed init message: {0}")]
    Malformed(String),

    /// First message was something other than `init`
    #[error("expected init message, got {0}")]
    UnexpectedMessage(String),

    /// `role` missing or not `publisher`
    #[error("unsupported role: {0:?}")]
    UnsupportedRole(Option<String>),

    /// `publisherId` missing or empty
    #[error("missing publisherId")]
    MissingPublisherId,

    /// `publisherId` present but not acceptable
    #[error("invalid publisherId: {0:?}")]
    InvalidPublisherId(String),

    /// Connection closed before the handshake
    #[error("connection closed before handshake")]
    ConnectionClosed,

    /// Handshake did not arrive in time
    #[error("handshake timed out")]
    Timeout,
}

/// A validated handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Stream being published
    pub publisher_id: PublisherId,
    /// Optional title, trimmed; `None` if blank
    pub title: Option<String>,
}

/// Validate the first frame of an ingest connection
pub fn parse_init(frame: IngestFrame) -> Result<Handshake, HandshakeError> {
    let text = match frame {
        IngestFrame::Text(text) => text,
        IngestFrame::Binary(data) => {
            return Err(HandshakeError::UnexpectedMessage(format!(
                "binary frame ({} bytes)",
                data.len()
            )))
        }
        IngestFrame::Close => return Err(HandshakeError::ConnectionClosed),
    };

    let init = match ClientMessage::parse(&text) {
        Ok(ClientMessage::Init(init)) => init,
        Ok(ClientMessage::Stop) => return Err(HandshakeError::UnexpectedMessage("stop".into())),
        Ok(ClientMessage::Other) => {
            return Err(HandshakeError::UnexpectedMessage("unknown message type".into()))
        }
        Err(e) => return Err(HandshakeError::Malformed(e.to_string())),
    };

    if init.role.as_deref() != Some(PUBLISHER_ROLE) {
        return Err(HandshakeError::UnsupportedRole(init.role));
    }

    let raw_id = match init.publisher_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => return Err(HandshakeError::MissingPublisherId),
    };
    let publisher_id = PublisherId::new(raw_id.clone())
        .map_err(|_| HandshakeError::InvalidPublisherId(raw_id))?;

    let title = init
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    Ok(Handshake {
        publisher_id,
        title,
    })
}
