//! # Beacon Server
//!
//! Serves the incident API. Every create, update and delete is written to the
//! incident store first and then announced on the event queue, where
//! `beacon-notifier` picks it up.

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use beacon_server::{
    AppState, create_app,
    infra::bootstrap::{self, Backends},
};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::{info, warn};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "beacon-server")]
#[command(about = "Incident service that announces every change on a queue")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Path to beacon.toml (overrides discovery)
    #[arg(long, env = "BEACON_CONFIG")]
    config: Option<PathBuf>,

    /// Server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long)]
    host: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ensure the incident table and event queue exist, then exit
    Provision,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Provision) => run_provision(&cli.serve).await,
        None => run_server(cli.serve).await,
    }
}

async fn run_provision(args: &ServeArgs) -> anyhow::Result<()> {
    let config = bootstrap::load_config(args.config.clone())?;
    if config.database.url.is_none() {
        anyhow::bail!("provisioning requires DATABASE_URL or database.url");
    }
    let backends = Backends::from_config(&config).await?;
    let report = bootstrap::provision(&backends, &config).await?;
    info!(
        table = %report.table,
        queue = %report.queue,
        "provisioning complete"
    );
    Ok(())
}

async fn run_server(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = bootstrap::load_config(args.config)?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }

    let backends = Backends::from_config(&config).await?;
    let service = bootstrap::build_service(&backends, &config).await?;
    let state = AppState::new(Arc::new(service), config.calls.per_call_timeout());
    let router = create_app(state);

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("invalid bind address {}", config.bind_address()))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(
        %addr,
        backend = ?backends.kind,
        queue = %config.queue.name,
        "Starting Beacon incident service"
    );
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Beacon incident service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
