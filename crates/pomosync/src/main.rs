//! # pomosync
//!
//! Hub binary: loads settings, installs logging and metrics, picks the
//! identity backend, and serves until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pomosync_core::logging::{self, LogFormat};
use pomosync_server::{HubServer, ServerConfig, identity, metrics};
use pomosync_settings::{PomoSettings, load_settings_from_path, settings_path};
use tracing::info;

/// Shared timer and chat hub.
#[derive(Parser, Debug)]
#[command(name = "pomosync", about = "Shared timer and chat session hub")]
struct Cli {
    /// Settings file (defaults to `~/.pomosync/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Maximum concurrent WebSocket connections (overrides settings).
    #[arg(long)]
    max_connections: Option<usize>,
}

impl Cli {
    /// Load the layered settings, then apply command-line overrides.
    fn resolve_settings(&self) -> Result<PomoSettings> {
        let path = self.config.clone().unwrap_or_else(settings_path);
        let mut settings = load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;

        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(max) = self.max_connections {
            settings.server.max_connections = max;
        }
        settings.validate().context("Invalid settings")?;
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.resolve_settings()?;

    logging::init_subscriber(
        &settings.logging.level,
        LogFormat::from_json_flag(settings.logging.json),
    );

    let metrics_handle =
        metrics::install_recorder().context("Failed to install metrics recorder")?;
    let identity = identity::from_settings(&settings.identity)
        .context("Failed to configure identity backend")?;
    info!(backend = ?settings.identity.backend, "identity backend ready");

    let server = HubServer::new(ServerConfig::from(&settings.server), identity, metrics_handle)
        .with_identity_timeout(Duration::from_millis(settings.identity.timeout_ms));

    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to bind listener")?;
    info!(%addr, "pomosync ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("shutting down");
    server.shutdown().graceful_shutdown(handle, None).await;
    Ok(())
}
