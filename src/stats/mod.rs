//! Statistics for streams, sessions and the server

pub mod metrics;

pub use metrics::{ServerCounters, ServerStats, SessionStats, StreamStats};
