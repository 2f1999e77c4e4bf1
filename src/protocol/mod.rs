//! Ingest wire protocol
//!
//! The publisher's connection carries JSON text messages for control and
//! binary messages for media:
//!
//! ```text
//! Publisher                                  Server
//!   |                                          |
//!   |-- {"type":"init","role":"publisher",  -->|  handshake
//!   |     "publisherId":"s1","title":"..."}    |
//!   |<-- {"type":"ready","publisherId":"s1", --|
//!   |      "url":"http://host/live/s1"}        |
//!   |                                          |
//!   |-- <binary media chunk> ----------------->|  appended verbatim
//!   |-- <binary media chunk> ----------------->|
//!   |-- {"type":"stop"} ---------------------->|  optional explicit stop
//!   |                                          |
//! ```

pub mod handshake;
pub mod message;

pub use handshake::{parse_init, Handshake, HandshakeError};
pub use message::{ClientMessage, IngestFrame, InitMessage, ServerMessage, PUBLISHER_ROLE};
