use std::{
    collections::HashMap,
    fmt,
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use beacon_model::{Incident, IncidentId};
use tokio::sync::RwLock;

use super::IncidentStore;
use crate::{
    error::{ProvisionError, StoreError, StoreResult},
    provision::Provisioning,
};

/// Process-local incident store used by tests and local development.
#[derive(Default)]
pub struct InMemoryIncidentStore {
    table_ready: AtomicBool,
    unavailable: AtomicBool,
    records: RwLock<HashMap<IncidentId, Incident>>,
}

impl fmt::Debug for InMemoryIncidentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryIncidentStore")
            .field("table_ready", &self.table_ready.load(Ordering::Relaxed))
            .field("unavailable", &self.unavailable.load(Ordering::Relaxed))
            .field(
                "records",
                &self.records.try_read().map(|r| r.len()).unwrap_or_default(),
            )
            .finish()
    }
}

impl InMemoryIncidentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates an outage: every call fails with `Unavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "in-memory store marked unavailable".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl IncidentStore for InMemoryIncidentStore {
    async fn ensure_table(&self) -> Result<Provisioning, ProvisionError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ProvisionError::new(
                "incident table",
                "in-memory store marked unavailable",
            ));
        }
        let already = self.table_ready.swap(true, Ordering::SeqCst);
        Ok(if already {
            Provisioning::Existing
        } else {
            Provisioning::Created
        })
    }

    async fn create(&self, incident: &Incident) -> StoreResult<()> {
        self.check_available()?;
        let mut records = self.records.write().await;
        if records.contains_key(&incident.incident_id) {
            return Err(StoreError::DuplicateKey(incident.incident_id.clone()));
        }
        records.insert(incident.incident_id.clone(), incident.clone());
        Ok(())
    }

    async fn get(&self, id: &IncidentId) -> StoreResult<Incident> {
        self.check_available()?;
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn update_status(
        &self,
        id: &IncidentId,
        status: &str,
    ) -> StoreResult<()> {
        self.check_available()?;
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        record.status = status.to_string();
        Ok(())
    }

    async fn delete(&self, id: &IncidentId) -> StoreResult<()> {
        self.check_available()?;
        self.records
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }
}
