//! # Beacon Notifier
//!
//! Drains the incident event queue and prints every change it receives.
//! Messages that fail processing stay on the queue and are retried once
//! their visibility timeout lapses.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use beacon_core::{EventConsumer, LoggingEventHandler};
use beacon_server::infra::bootstrap::{self, BackendKind, Backends};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "beacon-notifier")]
#[command(about = "Consumes incident change events from the queue")]
struct Cli {
    /// Path to beacon.toml (overrides discovery)
    #[arg(long, env = "BEACON_CONFIG")]
    config: Option<PathBuf>,

    /// Dead-letter messages delivered more than this many times
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    max_receive_count: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = bootstrap::load_config(cli.config)?;

    let backends = Backends::from_config(&config).await?;
    if backends.kind == BackendKind::InMemory {
        warn!("in-memory queue is private to this process; nothing will arrive");
    }

    let mut consumer_config = config.consumer_config();
    if let Some(limit) = cli.max_receive_count {
        consumer_config.max_receive_count = Some(limit);
    }

    let consumer = EventConsumer::connect(
        backends.queue.clone(),
        &config.queue.name,
        Arc::new(LoggingEventHandler),
        consumer_config,
    )
    .await
    .context("failed to attach to event queue")?;

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(tokio::signal::ctrl_c(), shutdown.clone()));

    info!(
        queue = %consumer.queue(),
        max_messages = consumer.config().max_messages,
        wait_time = ?consumer.config().wait_time,
        visibility_timeout = ?consumer.config().visibility_timeout,
        max_receive_count = ?consumer.config().max_receive_count,
        "Listening for incident events"
    );
    let totals = consumer.run(shutdown).await;
    info!(
        received = totals.received,
        deleted = totals.deleted,
        failed = totals.failed,
        dead_lettered = totals.dead_lettered,
        "Beacon notifier stopped"
    );
    Ok(())
}

/// Cancels `shutdown` once `signal` fires. A signal that cannot be listened
/// for never cancels.
async fn cancel_on_signal<F>(signal: F, shutdown: CancellationToken)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(err) = signal.await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
    shutdown.cancel();
}
