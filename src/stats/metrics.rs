//! Statistics and metrics for relay sessions

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Session-level statistics, for one ingest or viewer session
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Total bytes received from the peer
    pub bytes_received: u64,
    /// Total bytes sent to the peer
    pub bytes_sent: u64,
    /// Binary media chunks received
    pub chunks_received: u64,
    /// Chunks sent
    pub chunks_sent: u64,
    /// Text frames received in streaming state and ignored
    pub ignored_messages: u64,
    /// Connection duration
    pub duration: Duration,
    /// Current bitrate estimate (bits/sec)
    pub bitrate: u64,
}

impl SessionStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a received media chunk
    pub fn on_chunk_received(&mut self, len: usize) {
        self.chunks_received += 1;
        self.bytes_received += len as u64;
    }

    /// Record a delivered chunk
    pub fn on_chunk_sent(&mut self, len: usize) {
        self.chunks_sent += 1;
        self.bytes_sent += len as u64;
    }

    /// Calculate bitrate from bytes and duration
    pub fn calculate_bitrate(&mut self) {
        let secs = self.duration.as_secs();
        let bytes = self.bytes_received.max(self.bytes_sent);
        if secs > 0 {
            self.bitrate = (bytes * 8) / secs;
        }
    }
}

/// Stream-level statistics, snapshotted from a stream log
#[derive(Debug, Clone, Serialize)]
pub struct StreamStats {
    /// Publisher id
    pub publisher_id: String,
    /// Title announced by the publisher
    pub title: Option<String>,
    /// Bytes committed
    pub bytes: u64,
    /// Chunks committed
    pub chunks: u64,
    /// Attached viewers
    pub viewers: u32,
    /// Whether the writer is gone
    pub closed: bool,
    /// Whether the log was closed by a storage failure
    pub failed: bool,
    /// Time since the log was created
    #[serde(skip)]
    pub age: Duration,
}

impl StreamStats {
    /// Whether a publisher is still appending
    pub fn is_live(&self) -> bool {
        !self.closed
    }

    /// Calculate average bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.age.as_secs();
        if secs > 0 {
            (self.bytes * 8) / secs
        } else {
            0
        }
    }
}

/// Live server-wide counters
#[derive(Debug)]
pub struct ServerCounters {
    started_at: Instant,
    total_ingest: AtomicU64,
    active_ingest: AtomicU64,
    total_viewers: AtomicU64,
    active_viewers: AtomicU64,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
}

impl Default for ServerCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerCounters {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_ingest: AtomicU64::new(0),
            active_ingest: AtomicU64::new(0),
            total_viewers: AtomicU64::new(0),
            active_viewers: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
        }
    }

    pub fn ingest_opened(&self) {
        self.total_ingest.fetch_add(1, Ordering::Relaxed);
        self.active_ingest.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ingest_closed(&self, stats: &SessionStats) {
        self.active_ingest.fetch_sub(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(stats.bytes_received, Ordering::Relaxed);
    }

    pub fn viewer_opened(&self) {
        self.total_viewers.fetch_add(1, Ordering::Relaxed);
        self.active_viewers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn viewer_closed(&self, stats: &SessionStats) {
        self.active_viewers.fetch_sub(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(stats.bytes_sent, Ordering::Relaxed);
    }

    /// Snapshot the counters
    pub fn snapshot(&self, active_streams: u64) -> ServerStats {
        ServerStats {
            total_ingest: self.total_ingest.load(Ordering::Relaxed),
            active_ingest: self.active_ingest.load(Ordering::Relaxed),
            total_viewers: self.total_viewers.load(Ordering::Relaxed),
            active_viewers: self.active_viewers.load(Ordering::Relaxed),
            total_bytes_received: self.bytes_received.load(Ordering::Relaxed),
            total_bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            active_streams,
            uptime: self.started_at.elapsed(),
        }
    }
}

/// Server-wide statistics
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStats {
    /// Ingest connections ever accepted
    pub total_ingest: u64,
    /// Ingest connections currently open
    pub active_ingest: u64,
    /// Viewer responses ever started
    pub total_viewers: u64,
    /// Viewer responses currently streaming
    pub active_viewers: u64,
    /// Total media bytes received from publishers
    pub total_bytes_received: u64,
    /// Total bytes delivered to viewers
    pub total_bytes_sent: u64,
    /// Addressable streams
    pub active_streams: u64,
    /// Uptime
    #[serde(skip)]
    pub uptime: Duration,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_stats_new() {
        let stats = SessionStats::new();
        assert_eq!(stats.bytes_received, 0);
        assert_eq!(stats.bytes_sent, 0);
        assert_eq!(stats.chunks_received, 0);
        assert_eq!(stats.ignored_messages, 0);
        assert_eq!(stats.bitrate, 0);
    }

    #[test]
    fn test_session_stats_calculate_bitrate() {
        let mut stats = SessionStats::new();
        stats.on_chunk_received(1_000_000); // 1 MB
        stats.duration = Duration::from_secs(10);

        stats.calculate_bitrate();

        // 1,000,000 bytes * 8 bits / 10 seconds = 800,000 bps
        assert_eq!(stats.bitrate, 800_000);
        assert_eq!(stats.chunks_received, 1);
    }

    #[test]
    fn test_session_stats_calculate_bitrate_zero_duration() {
        let mut stats = SessionStats::new();
        stats.on_chunk_sent(1_000_000);
        stats.duration = Duration::from_secs(0);

        stats.calculate_bitrate();

        // With zero duration, bitrate should remain 0
        assert_eq!(stats.bitrate, 0);
    }

    #[test]
    fn test_stream_stats_bitrate() {
        let stats = StreamStats {
            publisher_id: "s1".into(),
            title: None,
            bytes: 5_000_000,
            chunks: 25,
            viewers: 3,
            closed: false,
            failed: false,
            age: Duration::from_secs(5),
        };

        assert!(stats.is_live());
        assert_eq!(stats.bitrate(), 8_000_000);
    }

    #[test]
    fn test_server_counters() {
        let counters = ServerCounters::new();

        counters.ingest_opened();
        counters.viewer_opened();
        counters.viewer_opened();

        let mut viewer = SessionStats::new();
        viewer.on_chunk_sent(100);
        counters.viewer_closed(&viewer);

        let snapshot = counters.snapshot(1);
        assert_eq!(snapshot.total_ingest, 1);
        assert_eq!(snapshot.active_ingest, 1);
        assert_eq!(snapshot.total_viewers, 2);
        assert_eq!(snapshot.active_viewers, 1);
        assert_eq!(snapshot.total_bytes_sent, 100);
        assert_eq!(snapshot.active_streams, 1);
    }
}
