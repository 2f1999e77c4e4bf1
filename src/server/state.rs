//! Shared handler state

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::http::{header, HeaderMap};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::registry::{LogRegistry, PublisherId};
use crate::server::config::ServerConfig;
use crate::session::SessionContext;
use crate::stats::{ServerCounters, ServerStats};

/// State injected into every handler
#[derive(Clone)]
pub struct AppState {
    /// Publisher id to stream log mapping
    pub registry: Arc<LogRegistry>,
    /// Server configuration
    pub config: Arc<ServerConfig>,
    /// Server-wide counters
    pub counters: Arc<ServerCounters>,
    next_session_id: Arc<AtomicU64>,
    ingest_limit: Option<Arc<Semaphore>>,
}

impl AppState {
    pub fn new(config: ServerConfig, registry: Arc<LogRegistry>) -> Self {
        let ingest_limit = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            registry,
            config: Arc::new(config),
            counters: Arc::new(ServerCounters::new()),
            next_session_id: Arc::new(AtomicU64::new(1)),
            ingest_limit,
        }
    }

    /// Context for a newly accepted request
    pub fn new_session(&self, peer_addr: Option<SocketAddr>) -> SessionContext {
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        SessionContext::new(session_id, peer_addr)
    }

    /// Reserve an ingest slot
    ///
    /// Fails when the connection limit is reached; `Ok(None)` when there is
    /// no limit.
    pub fn try_acquire_ingest(&self) -> Result<Option<OwnedSemaphorePermit>, TryAcquireError> {
        match self.ingest_limit {
            Some(ref sem) => sem.clone().try_acquire_owned().map(Some),
            None => Ok(None),
        }
    }

    /// Base of client-facing URLs: the configured public URL, or the
    /// request's `Host`
    pub fn base_url(&self, headers: &HeaderMap) -> String {
        if let Some(ref base) = self.config.public_base_url {
            return base.trim_end_matches('/').to_string();
        }

        let host = headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| self.config.bind_addr.to_string());
        format!("http://{}", host)
    }

    /// Attach URL for a publisher
    pub fn attach_url(&self, headers: &HeaderMap, id: &PublisherId) -> String {
        live_url(&self.base_url(headers), id)
    }

    /// Snapshot server-wide statistics
    pub fn stats(&self) -> ServerStats {
        self.counters.snapshot(self.registry.stream_count() as u64)
    }
}

/// `<base>/live/<id>`
pub fn live_url(base: &str, id: &PublisherId) -> String {
    format!("{}/live/{}", base, id.url_segment())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn state(config: ServerConfig) -> AppState {
        AppState::new(config, Arc::new(LogRegistry::new()))
    }

    #[test]
    fn test_attach_url_from_host() {
        let state = state(ServerConfig::default());
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("relay.local:8080"));

        let id = PublisherId::new("my stream").unwrap();
        assert_eq!(
            state.attach_url(&headers, &id),
            "http://relay.local:8080/live/my%20stream"
        );
    }

    #[test]
    fn test_attach_url_prefers_public_base() {
        let state = state(ServerConfig::default().public_base_url("https://cdn.example.com/"));
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("internal:8080"));

        let id = PublisherId::new("s1").unwrap();
        assert_eq!(
            state.attach_url(&headers, &id),
            "https://cdn.example.com/live/s1"
        );
    }

    #[test]
    fn test_ingest_limit() {
        let state = state(ServerConfig::default().max_connections(1));

        let first = state.try_acquire_ingest().unwrap();
        assert!(first.is_some());
        assert!(state.try_acquire_ingest().is_err());

        drop(first);
        assert!(state.try_acquire_ingest().is_ok());
    }

    #[test]
    fn test_session_ids_increase() {
        let state = state(ServerConfig::default());
        let a = state.new_session(None);
        let b = state.new_session(None);
        assert!(b.session_id > a.session_id);
    }
}
