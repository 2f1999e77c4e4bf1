//! Relay server listener
//!
//! Binds the HTTP listener, serves the router and runs the registry cleanup
//! task for the lifetime of the server.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;

use crate::error::Result;
use crate::registry::LogRegistry;
use crate::server::config::ServerConfig;
use crate::server::router::build_router;
use crate::server::state::AppState;

/// Live relay server
pub struct RelayServer {
    state: AppState,
}

impl RelayServer {
    /// Create a server whose registry uses the configured storage backend
    pub fn new(config: ServerConfig) -> Self {
        let registry = LogRegistry::with_backend(config.registry.clone(), config.storage_backend());
        Self::with_registry(config, Arc::new(registry))
    }

    /// Create a server around an existing registry
    pub fn with_registry(config: ServerConfig, registry: Arc<LogRegistry>) -> Self {
        Self {
            state: AppState::new(config, registry),
        }
    }

    /// Get a reference to the log registry
    pub fn registry(&self) -> &Arc<LogRegistry> {
        &self.state.registry
    }

    /// Get the configuration
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.state.config.bind_addr
    }

    /// Build the router (useful for testing)
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Run the server
    ///
    /// This method blocks until the server fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.state.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            addr = %addr,
            storage = ?self.state.config.storage,
            dir = %self.state.config.storage_dir.display(),
            "Relay server listening"
        );

        let cleanup_handle = self.state.registry.spawn_cleanup_task();

        let app = self.router();
        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            tracing::info!("Shutdown signal received");
        })
        .await;

        // Stop cleanup task on shutdown
        cleanup_handle.abort();

        result.map_err(Into::into)
    }
}
