//! Keyed persistence for incident records.
//!
//! Every operation is atomic on a single key; nothing spans records.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use beacon_model::{Incident, IncidentId};

use crate::{
    error::{ProvisionError, StoreResult},
    provision::Provisioning,
};

pub use memory::InMemoryIncidentStore;
pub use postgres::PostgresIncidentStore;

/// Abstracts the durable table holding incidents, keyed by incident id.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Creates the backing table unless it already exists.
    async fn ensure_table(&self) -> Result<Provisioning, ProvisionError>;

    /// Inserts a new record. Fails with `DuplicateKey` instead of replacing an
    /// existing record under the same id.
    async fn create(&self, incident: &Incident) -> StoreResult<()>;

    async fn get(&self, id: &IncidentId) -> StoreResult<Incident>;

    /// Partial update restricted to the mutable status field.
    async fn update_status(
        &self,
        id: &IncidentId,
        status: &str,
    ) -> StoreResult<()>;

    async fn delete(&self, id: &IncidentId) -> StoreResult<()>;
}
