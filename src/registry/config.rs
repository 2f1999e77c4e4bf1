//! Registry configuration

use std::time::Duration;

use serde::Deserialize;

/// How a viewer waits for a log that does not exist yet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationWait {
    /// Wake on the registry's creation notification
    #[default]
    Notify,
    /// Re-check the registry every `poll_interval`
    Poll,
}

/// Configuration for the log registry
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// How long a viewer waits for a not-yet-created log before not-found
    #[serde(with = "duration_ms")]
    pub grace_period: Duration,

    /// Wait strategy during the grace period
    pub creation_wait: CreationWait,

    /// Poll interval when `creation_wait` is `Poll`
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,

    /// How long a closed, drained log stays addressable before removal
    #[serde(with = "duration_ms")]
    pub retention: Duration,

    /// Interval of the background cleanup task
    #[serde(with = "duration_ms")]
    pub cleanup_interval: Duration,

    /// Delete a log's storage when it is removed
    pub remove_storage_on_expire: bool,

    /// Maximum size of a chunk handed to a viewer
    pub read_chunk_size: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(10),
            creation_wait: CreationWait::Notify,
            poll_interval: Duration::from_millis(250),
            retention: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(30),
            remove_storage_on_expire: true,
            read_chunk_size: 64 * 1024,
        }
    }
}

impl RegistryConfig {
    /// Set the viewer grace period
    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Poll for log creation instead of waiting on notifications
    pub fn poll_every(mut self, interval: Duration) -> Self {
        self.creation_wait = CreationWait::Poll;
        self.poll_interval = interval;
        self
    }

    /// Set the retention of closed logs
    pub fn retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Set the cleanup interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Keep storage on disk when logs are removed
    pub fn keep_storage(mut self) -> Self {
        self.remove_storage_on_expire = false;
        self
    }

    /// Set the maximum viewer chunk size
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }
}

/// Serde adapter for durations written as integer milliseconds
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();

        assert_eq!(config.grace_period, Duration::from_secs(10));
        assert_eq!(config.creation_wait, CreationWait::Notify);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert!(config.remove_storage_on_expire);
    }

    #[test]
    fn test_builder_chaining() {
        let config = RegistryConfig::default()
            .grace_period(Duration::from_secs(2))
            .poll_every(Duration::from_millis(50))
            .retention(Duration::from_secs(1))
            .keep_storage()
            .read_chunk_size(0);

        assert_eq!(config.grace_period, Duration::from_secs(2));
        assert_eq!(config.creation_wait, CreationWait::Poll);
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.retention, Duration::from_secs(1));
        assert!(!config.remove_storage_on_expire);
        assert_eq!(config.read_chunk_size, 1);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: RegistryConfig =
            toml::from_str("grace_period = 1500\ncreation_wait = \"poll\"").unwrap();

        assert_eq!(config.grace_period, Duration::from_millis(1500));
        assert_eq!(config.creation_wait, CreationWait::Poll);
        assert_eq!(config.retention, Duration::from_secs(300));
    }
}
