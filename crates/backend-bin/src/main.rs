// ============================
// crates/backend-bin/src/main.rs
// ============================
//! Tokio / Axum entry-point for the co-op room server.
use anyhow::Context;
use backend_lib::{config::Settings, spawn_sweeper, storage::FlatFileStorage, ws_router, AppState};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "coop-server", about = "Two-player co-op room server")]
struct Cli {
    /// TOML configuration file; missing files fall back to defaults
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Override `bind_addr`
    #[arg(long)]
    bind: Option<SocketAddr>,
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if settings.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    if let Some(bind) = cli.bind {
        settings.bind_addr = bind;
    }
    init_tracing(&settings);

    let storage = FlatFileStorage::new(&settings.data_dir)
        .with_context(|| format!("preparing data directory {}", settings.data_dir.display()))?;

    let addr = settings.bind_addr;
    let state = AppState::new(settings, storage);
    let sweeper = spawn_sweeper(&state);
    let app = ws_router::create_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    Ok(())
}
