//! live-relay server
//!
//! Run with: live-relay [--config relay.toml] [--bind ADDR] [--storage-dir DIR]
//!
//! ## Publishing
//!
//! Open a WebSocket to `ws://HOST/`, send
//! `{"type":"init","role":"publisher","publisherId":"s1"}` and then the
//! media as binary messages (e.g. `MediaRecorder` WebM chunks).
//!
//! ## Watching
//!
//!   ffplay http://localhost:8080/live/s1
//!   curl http://localhost:8080/video-url/s1

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use live_relay::{RelayServer, ServerConfig};

#[derive(Debug, Parser)]
#[command(name = "live-relay", version, about = "File-backed live video relay")]
struct Cli {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind to
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Directory for stream files
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Keep streams in memory instead of on disk
    #[arg(long)]
    in_memory: bool,

    /// Viewer grace period in milliseconds
    #[arg(long)]
    grace_ms: Option<u64>,

    /// Allowed CORS origin (repeatable)
    #[arg(long = "allow-origin")]
    allow_origins: Vec<String>,

    /// Base URL for attach URLs handed to clients
    #[arg(long)]
    public_url: Option<String>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match self.config {
            Some(ref path) => ServerConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ServerConfig::default(),
        };

        if let Some(addr) = self.bind {
            config = config.bind(addr);
        }
        if let Some(dir) = self.storage_dir {
            config = config.storage_dir(dir);
        }
        if self.in_memory {
            config = config.in_memory();
        }
        if let Some(ms) = self.grace_ms {
            config = config.grace_period(Duration::from_millis(ms));
        }
        if !self.allow_origins.is_empty() {
            config.allowed_origins = self.allow_origins;
        }
        if let Some(url) = self.public_url {
            config = config.public_base_url(url);
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "live_relay=info,tower_http=info".into()),
        )
        .init();

    let config = Cli::parse().into_config()?;
    let server = RelayServer::new(config);

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("relay server failed")?;

    tracing::info!("Shut down");
    Ok(())
}
