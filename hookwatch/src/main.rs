//! hookwatch - activity telemetry server for AI coding assistants
//!
//! Receives hook events over HTTP, stores them in SQLite and streams every
//! recorded event to dashboard clients over a WebSocket.

mod routes;
mod ws;

use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hookwatch_core::{Config, Ingestor};

#[derive(Debug, Parser)]
#[command(author, version, about = "Activity telemetry server for AI coding assistants")]
struct Cli {
    /// Override the config file path
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the SQLite database path
    #[arg(long, value_name = "PATH")]
    database: Option<PathBuf>,

    /// Address to bind (defaults to server.host from config)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (defaults to server.port from config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Also log to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;

    let _log_guard = hookwatch_core::logging::init(&config.logging, cli.verbose)
        .context("failed to initialize logging")?;

    let db_path = cli.database.clone().unwrap_or_else(Config::database_path);
    tracing::info!(path = %db_path.display(), "Opening database");

    let ingestor = Ingestor::open(&config, &db_path, &Config::reset_point_path())
        .context("failed to start ingestion")?;
    let ingestor = Arc::new(ingestor);

    let host = cli.host.unwrap_or_else(|| config.server.host.clone());
    let port = cli.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;

    let app = routes::router(Arc::clone(&ingestor));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "hookwatch listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Let queued aggregate updates land before the process exits
    ingestor.settle().await;
    tracing::info!("hookwatch shut down");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
