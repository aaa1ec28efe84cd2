// crates/server/src/main.rs
//! Stevedore server binary.
//!
//! Starts the Axum HTTP server, the lock-file watcher, and (unless
//! disabled) the periodic reaper. Job creation returns immediately; the
//! archiver runs on background tasks.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use stevedore_core::{CliArchiver, Config};
use stevedore_server::lock::{spawn_watcher, LOCK_POLL_INTERVAL};
use stevedore_server::reaper::Reaper;
use stevedore_server::{create_app, AppState};

/// Default port for the server.
const DEFAULT_PORT: u16 = 47810;

#[derive(Debug, Parser)]
#[command(name = "stevedore", about = "Bulk export/import server", version)]
struct Cli {
    /// Port to listen on (falls back to STEVEDORE_PORT, then the default).
    #[arg(long)]
    port: Option<u16>,

    /// Working directory for archive artifacts (overrides STEVEDORE_TEMP_DIR).
    #[arg(long)]
    temp_dir: Option<PathBuf>,
}

fn get_port(cli: &Cli) -> u16 {
    cli.port
        .or_else(|| {
            std::env::var("STEVEDORE_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
        })
        .unwrap_or(DEFAULT_PORT)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let port = get_port(&cli);

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("stevedore=info,tower_http=info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;

    let mut config = Config::from_env().context("invalid configuration")?;
    if let Some(dir) = cli.temp_dir {
        config.temp_dir = dir;
    }

    std::fs::create_dir_all(&config.temp_dir).with_context(|| {
        format!(
            "failed to create working directory {}",
            config.temp_dir.display()
        )
    })?;

    let archiver = Arc::new(CliArchiver::from_config(&config));
    let state = AppState::new(config.clone(), archiver);

    // Keep the watcher handle alive for the lifetime of the process;
    // dropping it would stop lock change notifications.
    let _lock_watcher = spawn_watcher(Arc::clone(&state.lock), LOCK_POLL_INTERVAL)
        .context("failed to start lock watcher")?;

    if config.auto_cleanup {
        let reaper = Reaper::from_config(
            &config,
            Arc::clone(&state.registry),
            Arc::clone(&state.artifacts),
        );
        reaper.spawn(config.cleanup_interval);
        tracing::info!(
            interval_secs = config.cleanup_interval.as_secs(),
            "Reaper enabled"
        );
    } else {
        tracing::info!("Reaper disabled by configuration");
    }

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(
        %addr,
        temp_dir = %config.temp_dir.display(),
        import_enabled = config.enable_import,
        "Stevedore listening"
    );

    let app = create_app(state);
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
