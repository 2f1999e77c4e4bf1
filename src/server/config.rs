//! Server configuration

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::registry::config::duration_ms;
use crate::registry::RegistryConfig;
use crate::stream_log::{FileBackend, MemoryBackend, StorageBackend, SyncMode};

/// Where stream bytes are kept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    /// One file per stream under `storage_dir`
    #[default]
    File,
    /// Process memory only
    Memory,
}

/// Server configuration options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Directory for stream files
    pub storage_dir: PathBuf,

    /// Storage backend
    pub storage: StorageKind,

    /// Extension of stream files, also accepted as a suffix on `/live/{id}`
    pub file_extension: String,

    /// Content type of the attach response
    pub content_type: String,

    /// Flush strategy for file storage
    pub sync_mode: SyncMode,

    /// Origins allowed by CORS (`*` allows any)
    pub allowed_origins: Vec<String>,

    /// Base of URLs handed to clients; derived from `Host` when unset
    pub public_base_url: Option<String>,

    /// The publisher's `init` message must arrive within this time
    #[serde(with = "duration_ms")]
    pub handshake_timeout: Duration,

    /// Maximum concurrent ingest connections (0 = unlimited)
    pub max_connections: usize,

    /// Registry settings (grace period, retention, cleanup)
    pub registry: RegistryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            storage_dir: PathBuf::from("publisher_liveStream"),
            storage: StorageKind::File,
            file_extension: "webm".to_string(),
            content_type: "video/webm".to_string(),
            sync_mode: SyncMode::OsDefault,
            allowed_origins: vec!["http://localhost:3000".to_string()],
            public_base_url: None,
            handshake_timeout: Duration::from_secs(10),
            max_connections: 0, // Unlimited
            registry: RegistryConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Store streams as files under `dir`
    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage = StorageKind::File;
        self.storage_dir = dir.into();
        self
    }

    /// Keep streams in memory
    pub fn in_memory(mut self) -> Self {
        self.storage = StorageKind::Memory;
        self
    }

    /// Add an allowed CORS origin
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origins.push(origin.into());
        self
    }

    /// Set the base URL used in attach URLs
    pub fn public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = Some(url.into());
        self
    }

    /// Set handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set maximum ingest connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the viewer grace period
    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.registry.grace_period = grace;
        self
    }

    /// Replace registry settings
    pub fn registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }

    /// Build the configured storage backend
    pub fn storage_backend(&self) -> Arc<dyn StorageBackend> {
        match self.storage {
            StorageKind::File => Arc::new(FileBackend::new(
                self.storage_dir.clone(),
                self.file_extension.clone(),
                self.sync_mode,
            )),
            StorageKind::Memory => Arc::new(MemoryBackend::new()),
        }
    }

    /// Strip the configured extension from a `/live/{id}` path segment
    pub fn strip_extension<'a>(&self, segment: &'a str) -> &'a str {
        if self.file_extension.is_empty() {
            return segment;
        }
        segment
            .strip_suffix(self.file_extension.as_str())
            .and_then(|s| s.strip_suffix('.'))
            .filter(|s| !s.is_empty())
            .unwrap_or(segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CreationWait;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.storage, StorageKind::File);
        assert_eq!(config.storage_dir, PathBuf::from("publisher_liveStream"));
        assert_eq!(config.content_type, "video/webm");
        assert_eq!(config.allowed_origins, vec!["http://localhost:3000"]);
        assert_eq!(config.registry.grace_period, Duration::from_secs(10));
        assert_eq!(config.max_connections, 0);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .in_memory()
            .allow_origin("https://example.com")
            .public_base_url("https://relay.example.com")
            .handshake_timeout(Duration::from_secs(2))
            .max_connections(4)
            .grace_period(Duration::from_millis(500));

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.storage, StorageKind::Memory);
        assert_eq!(config.allowed_origins.len(), 2);
        assert_eq!(config.public_base_url.as_deref(), Some("https://relay.example.com"));
        assert_eq!(config.handshake_timeout, Duration::from_secs(2));
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.registry.grace_period, Duration::from_millis(500));
    }

    #[test]
    fn test_from_toml() {
        let config = ServerConfig::from_toml_str(
            r#"
            bind_addr = "127.0.0.1:8081"
            storage = "memory"
            allowed_origins = ["*"]
            handshake_timeout = 2500

            [registry]
            grace_period = 3000
            creation_wait = "poll"
            poll_interval = 100
            "#,
        )
        .unwrap();

        assert_eq!(config.bind_addr.port(), 8081);
        assert_eq!(config.storage, StorageKind::Memory);
        assert_eq!(config.allowed_origins, vec!["*"]);
        assert_eq!(config.handshake_timeout, Duration::from_millis(2500));
        assert_eq!(config.registry.grace_period, Duration::from_secs(3));
        assert_eq!(config.registry.creation_wait, CreationWait::Poll);
        assert_eq!(config.registry.poll_interval, Duration::from_millis(100));
        assert_eq!(config.file_extension, "webm");
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        let err = ServerConfig::from_toml_str("bind_addr = 12").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_strip_extension() {
        let config = ServerConfig::default();

        assert_eq!(config.strip_extension("s1.webm"), "s1");
        assert_eq!(config.strip_extension("s1"), "s1");
        assert_eq!(config.strip_extension("s1webm"), "s1webm");
        assert_eq!(config.strip_extension(".webm"), ".webm");
    }
}
