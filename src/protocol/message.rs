//! Ingest messages

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// The only role accepted on the ingest channel
pub const PUBLISHER_ROLE: &str = "publisher";

/// A transport-level frame on the ingest connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestFrame {
    /// Text frame (JSON control message)
    Text(String),
    /// Binary frame (opaque media chunk)
    Binary(Bytes),
    /// Peer closed the connection
    Close,
}

/// Control messages sent by the publisher
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Handshake; must be the first message
    Init(InitMessage),
    /// Explicit end of stream
    Stop,
    /// Any other `type`
    #[serde(other)]
    Other,
}

/// Body of the `init` handshake
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitMessage {
    /// Declared role; must be [`PUBLISHER_ROLE`]
    #[serde(default)]
    pub role: Option<String>,
    /// Stream identifier
    #[serde(default)]
    pub publisher_id: Option<String>,
    /// Optional human-readable title
    #[serde(default)]
    pub title: Option<String>,
}

impl ClientMessage {
    /// Parse a text frame
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Messages sent back to the publisher
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Handshake accepted
    Ready {
        #[serde(rename = "publisherId")]
        publisher_id: String,
        url: String,
    },
}

impl ServerMessage {
    /// Serialize to a JSON text frame
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_init() {
        let msg = ClientMessage::parse(
            r#"{"type":"init","role":"publisher","publisherId":"s1","title":"My Stream"}"#,
        )
        .unwrap();

        assert_eq!(
            msg,
            ClientMessage::Init(InitMessage {
                role: Some("publisher".into()),
                publisher_id: Some("s1".into()),
                title: Some("My Stream".into()),
            })
        );
    }

    #[test]
    fn test_parse_init_ignores_extra_fields() {
        let msg =
            ClientMessage::parse(r#"{"type":"init","role":"publisher","publisherId":"s1","fps":30}"#)
                .unwrap();
        assert!(matches!(msg, ClientMessage::Init(_)));
    }

    #[test]
    fn test_parse_stop_and_unknown() {
        assert_eq!(ClientMessage::parse(r#"{"type":"stop"}"#).unwrap(), ClientMessage::Stop);
        assert_eq!(ClientMessage::parse(r#"{"type":"chat"}"#).unwrap(), ClientMessage::Other);
        assert!(ClientMessage::parse("hello").is_err());
    }

    #[test]
    fn test_ready_json() {
        let msg = ServerMessage::Ready {
            publisher_id: "s1".into(),
            url: "http://localhost:8080/live/s1".into(),
        };
        assert_eq!(
            msg.to_json(),
            r#"{"type":"ready","publisherId":"s1","url":"http://localhost:8080/live/s1"}"#
        );
    }
}
