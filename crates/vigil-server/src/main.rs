//! vigil-server - HTTP control plane for the vigil daemon supervisor.
//!
//! Opens the daemon store, resumes every enabled daemon, and serves the
//! JSON control plane until SIGTERM/SIGINT. On shutdown every supervised
//! process group is killed but the records stay enabled, so the next
//! launch resumes them.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use vigil_core::{DaemonStore, Engine};

mod routes;

/// vigil-server - remote daemon supervisor
#[derive(Parser, Debug)]
#[command(name = "vigil-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value_t = 8666)]
    port: u16,

    /// Database file
    #[arg(long, default_value = "vigil.db")]
    db: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = DaemonStore::open(&args.db)
        .with_context(|| format!("failed to open daemon store {:?}", args.db))?;
    let engine = Engine::open(store)
        .await
        .context("failed to start supervisor engine")?;

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, db = %args.db.display(), "serving control plane");

    axum::serve(listener, routes::router(engine.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    engine.shutdown().await;
    info!("supervisor stopped");
    Ok(())
}

/// Resolves when SIGTERM or SIGINT arrives.
async fn shutdown_signal() {
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT");
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }
}
