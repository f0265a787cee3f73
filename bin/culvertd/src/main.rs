//! ---
//! culvert_section: "03-agent-surface"
//! culvert_subsection: "binary"
//! culvert_type: "source"
//! culvert_scope: "code"
//! culvert_description: "Binary entrypoint for the Culvert daemon."
//! culvert_version: "v0.1.0"
//! culvert_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use culvert_agent::{
    spawn_api_server, spawn_journal_follower, AgentSettings, ApiState, ConfigStore,
    LogBroadcaster, SettingsSource, SystemdManager,
};
use tokio::signal;
use tracing::{info, warn};

// Undelivered live log lines buffered per WebSocket subscriber.
const LOG_STREAM_CAPACITY: usize = 256;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Culvert control daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to the daemon settings file")]
    config: Option<PathBuf>,

    #[arg(
        long,
        value_name = "ADDR",
        help = "Override the configured listen address"
    )]
    listen: Option<SocketAddr>,

    #[arg(long, value_name = "UNIT", help = "Override the supervised systemd unit")]
    unit: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut settings, source) = AgentSettings::load(cli.config.as_deref())?;
    if let Some(listen) = cli.listen {
        settings.listen = listen;
    }
    if let Some(unit) = cli.unit {
        settings.unit = unit;
    }
    settings.validate()?;

    culvert_logging::init_daemon("culvertd", &settings.logging)?;
    match &source {
        SettingsSource::Explicit(path) => {
            info!(settings_path = %path.display(), "settings loaded from --config")
        }
        SettingsSource::Environment(path) => {
            info!(settings_path = %path.display(), "settings loaded from CULVERT_CONFIG")
        }
        SettingsSource::Discovered(path) => {
            info!(settings_path = %path.display(), "settings discovered")
        }
        SettingsSource::Defaults => info!("no settings file found; using built-in defaults"),
    }

    let static_dir = settings.static_dir.clone().and_then(|dir| {
        if dir.is_dir() {
            Some(dir)
        } else {
            warn!(static_dir = %dir.display(), "static_dir not found; serving API without assets");
            None
        }
    });

    let manager = Arc::new(SystemdManager::new(settings.unit.clone()));
    let store = ConfigStore::new(settings.config_path.clone());
    let logs = LogBroadcaster::new(LOG_STREAM_CAPACITY);
    let follower = spawn_journal_follower(settings.unit.clone(), logs.clone());

    let state = Arc::new(ApiState::new(
        manager,
        store,
        logs,
        settings.recent_log_count,
    ));
    let server = spawn_api_server(state, settings.listen, static_dir)?;
    info!(address = %server.addr(), unit = %settings.unit, "culvertd running; waiting for termination signal");

    shutdown_signal().await;
    info!("termination signal received; shutting down");

    server.shutdown().await?;
    follower.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        tokio::select! {
            _ = ctrl_c() => {},
            _ = terminate() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
    }
}

async fn ctrl_c() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(?err, "failed to install Ctrl+C handler");
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(err) => warn!(?err, "failed to install SIGTERM handler"),
    }
}

#[cfg(not(unix))]
async fn terminate() {}
