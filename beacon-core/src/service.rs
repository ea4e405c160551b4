//! Incident lifecycle operations.
//!
//! Every mutation commits to the record store first and announces a
//! [`ChangeEvent`] afterwards. A failed announcement never undoes the write;
//! it is reported through [`Notification::Failed`] instead.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use beacon_model::{ChangeEvent, Incident, IncidentId, NewIncident, StatusUpdate};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    context::CallContext,
    error::{QueueError, Result, StoreError},
    ids::mint_incident_id,
    queue::{EventPublisher, MessageId},
    store::IncidentStore,
};

/// Outcome of announcing a committed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Notification {
    Published { message_id: MessageId },
    Failed { reason: String },
}

impl Notification {
    pub fn is_published(&self) -> bool {
        matches!(self, Notification::Published { .. })
    }
}

/// A committed mutation's result paired with its announcement outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded<T> {
    pub value: T,
    pub notification: Notification,
}

impl<T> Recorded<T> {
    pub fn into_inner(self) -> T {
        self.value
    }
}

/// The four incident operations exposed to remote callers.
#[async_trait]
pub trait IncidentOperations: Send + Sync {
    async fn create_incident(
        &self,
        ctx: &CallContext,
        request: NewIncident,
    ) -> Result<Recorded<Incident>>;

    async fn get_incident(
        &self,
        ctx: &CallContext,
        id: &IncidentId,
    ) -> Result<Incident>;

    async fn update_incident(
        &self,
        ctx: &CallContext,
        id: &IncidentId,
        update: StatusUpdate,
    ) -> Result<Recorded<Incident>>;

    /// Removes the record and returns its last known snapshot.
    async fn delete_incident(
        &self,
        ctx: &CallContext,
        id: &IncidentId,
    ) -> Result<Recorded<Incident>>;
}

#[derive(Clone)]
pub struct IncidentService {
    store: Arc<dyn IncidentStore>,
    publisher: EventPublisher,
}

impl fmt::Debug for IncidentService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncidentService")
            .field("publisher", &self.publisher)
            .finish_non_exhaustive()
    }
}

impl IncidentService {
    pub fn new(store: Arc<dyn IncidentStore>, publisher: EventPublisher) -> Self {
        Self { store, publisher }
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    async fn read(&self, ctx: &CallContext, id: &IncidentId) -> Result<Incident> {
        Ok(ctx.bounded(self.store.get(id), StoreError::Timeout).await?)
    }

    async fn announce(&self, ctx: &CallContext, event: ChangeEvent) -> Notification {
        let outcome = ctx
            .bounded(self.publisher.publish(&event), QueueError::Timeout)
            .await;

        match outcome {
            Ok(message_id) => Notification::Published { message_id },
            Err(err) => {
                warn!(
                    incident_id = %event.incident.incident_id,
                    operation = %event.operation,
                    queue = %self.publisher.queue(),
                    error = %err,
                    "mutation committed but change event was not published"
                );
                Notification::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }
}

#[async_trait]
impl IncidentOperations for IncidentService {
    async fn create_incident(
        &self,
        ctx: &CallContext,
        request: NewIncident,
    ) -> Result<Recorded<Incident>> {
        let incident = request.into_incident(mint_incident_id())?;

        ctx.checkpoint("store write")?;
        ctx.bounded(self.store.create(&incident), StoreError::Timeout)
            .await?;
        info!(incident_id = %incident.incident_id, "incident created");

        let notification =
            self.announce(ctx, ChangeEvent::created(incident.clone())).await;
        Ok(Recorded {
            value: incident,
            notification,
        })
    }

    async fn get_incident(
        &self,
        ctx: &CallContext,
        id: &IncidentId,
    ) -> Result<Incident> {
        ctx.checkpoint("store read")?;
        let incident = self.read(ctx, id).await?;
        debug!(incident_id = %id, "incident fetched");
        Ok(incident)
    }

    async fn update_incident(
        &self,
        ctx: &CallContext,
        id: &IncidentId,
        update: StatusUpdate,
    ) -> Result<Recorded<Incident>> {
        update.validate()?;

        ctx.checkpoint("store write")?;
        ctx.bounded(
            self.store.update_status(id, &update.status),
            StoreError::Timeout,
        )
        .await?;
        info!(incident_id = %id, status = %update.status, "incident status updated");

        // The write is committed; re-read the full snapshot for the event.
        let incident = match self.read(ctx, id).await {
            Ok(incident) => incident,
            Err(err) => {
                warn!(
                    incident_id = %id,
                    error = %err,
                    "status updated but snapshot re-read failed; no event published"
                );
                return Err(err);
            }
        };

        let notification =
            self.announce(ctx, ChangeEvent::updated(incident.clone())).await;
        Ok(Recorded {
            value: incident,
            notification,
        })
    }

    async fn delete_incident(
        &self,
        ctx: &CallContext,
        id: &IncidentId,
    ) -> Result<Recorded<Incident>> {
        ctx.checkpoint("store read")?;
        let snapshot = self.read(ctx, id).await?;

        ctx.checkpoint("store delete")?;
        ctx.bounded(self.store.delete(id), StoreError::Timeout).await?;
        info!(incident_id = %id, "incident deleted");

        let notification =
            self.announce(ctx, ChangeEvent::deleted(snapshot.clone())).await;
        Ok(Recorded {
            value: snapshot,
            notification,
        })
    }
}
