//! Startup wiring shared by the service and notifier binaries.

use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Context;
use beacon_config::{Config, ConfigLoad, ConfigLoader};
use beacon_core::{
    EventPublisher, InMemoryIncidentStore, InMemoryMessageQueue,
    IncidentService, IncidentStore, MessageQueue, PostgresIncidentStore,
    PostgresMessageQueue, Provisioning,
};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use super::telemetry;

/// Loads configuration, installs tracing and reports anything questionable.
pub fn load_config(config_path: Option<PathBuf>) -> anyhow::Result<Config> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = config_path {
        loader = loader.with_config_path(path);
    }
    let ConfigLoad { config, warnings } =
        loader.load().context("failed to load configuration")?;

    telemetry::init_tracing();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "configuration file loaded");
    }
    for warning in warnings.iter() {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }

    Ok(config)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Postgres,
    InMemory,
}

/// Store and queue handles selected from configuration.
#[derive(Clone)]
pub struct Backends {
    pub store: Arc<dyn IncidentStore>,
    pub queue: Arc<dyn MessageQueue>,
    pub kind: BackendKind,
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backends")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Backends {
    /// Process-local backends, useful for development and tests.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemoryIncidentStore::new()),
            queue: Arc::new(InMemoryMessageQueue::new()),
            kind: BackendKind::InMemory,
        }
    }

    /// Connects to Postgres and applies the queue schema.
    pub async fn postgres(config: &Config, url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .connect(url)
            .await
            .context("failed to connect to PostgreSQL")?;

        let store =
            PostgresIncidentStore::with_table(pool.clone(), &config.store.table)
                .context("invalid incident table")?;
        let queue = PostgresMessageQueue::new(pool)
            .with_poll_interval(config.queue.poll_interval);
        queue
            .initialize_schema()
            .await
            .context("failed to apply queue schema")?;

        Ok(Self {
            store: Arc::new(store),
            queue: Arc::new(queue),
            kind: BackendKind::Postgres,
        })
    }

    /// Postgres when a database URL is configured, in-memory otherwise.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        match &config.database.url {
            Some(url) => Self::postgres(config, url).await,
            None => {
                warn!(
                    "no database configured; incidents and events live only in this process"
                );
                Ok(Self::in_memory())
            }
        }
    }
}

/// Outcome of provisioning the incident table and the event queue.
#[derive(Debug, Clone, Copy)]
pub struct ProvisionReport {
    pub table: Provisioning,
    pub queue: Provisioning,
}

/// Ensures the incident table and the event queue exist.
pub async fn provision(
    backends: &Backends,
    config: &Config,
) -> anyhow::Result<ProvisionReport> {
    let table = backends
        .store
        .ensure_table()
        .await
        .context("failed to provision incident table")?;
    let (_, queue) = backends
        .queue
        .ensure_queue(&config.queue.name)
        .await
        .context("failed to provision event queue")?;

    info!(
        table = %config.store.table,
        table_provisioning = %table,
        queue = %config.queue.name,
        queue_provisioning = %queue,
        "resources provisioned"
    );
    Ok(ProvisionReport { table, queue })
}

/// Provisions resources and builds the incident service on top of them.
pub async fn build_service(
    backends: &Backends,
    config: &Config,
) -> anyhow::Result<IncidentService> {
    backends
        .store
        .ensure_table()
        .await
        .context("failed to provision incident table")?;
    let publisher =
        EventPublisher::connect(backends.queue.clone(), &config.queue.name)
            .await
            .context("failed to provision event queue")?;
    Ok(IncidentService::new(backends.store.clone(), publisher))
}
