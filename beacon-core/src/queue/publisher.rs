use std::{fmt, sync::Arc};

use beacon_model::ChangeEvent;
use tracing::{debug, info};

use super::{MessageId, MessageQueue, QueueHandle};
use crate::error::{ProvisionError, QueueResult};

/// Sends change events to one provisioned queue.
#[derive(Clone)]
pub struct EventPublisher {
    queue: Arc<dyn MessageQueue>,
    handle: QueueHandle,
}

impl fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPublisher")
            .field("queue", &self.handle)
            .finish()
    }
}

impl EventPublisher {
    /// Provisions `queue_name` (creating it if needed) and returns a publisher
    /// bound to it.
    pub async fn connect(
        queue: Arc<dyn MessageQueue>,
        queue_name: &str,
    ) -> Result<Self, ProvisionError> {
        let (handle, outcome) = queue.ensure_queue(queue_name).await?;
        info!(queue = %handle, provisioning = %outcome, "event publisher ready");
        Ok(Self { queue, handle })
    }

    pub fn queue(&self) -> &QueueHandle {
        &self.handle
    }

    /// Encodes `event` as a flat JSON object and sends it.
    pub async fn publish(&self, event: &ChangeEvent) -> QueueResult<MessageId> {
        let body = event.to_wire()?;
        let id = self.queue.send(&self.handle, body).await?;
        debug!(
            queue = %self.handle,
            message_id = %id,
            operation = %event.operation,
            incident_id = %event.incident.incident_id,
            "change event published"
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use beacon_model::{Incident, IncidentId};

    use super::*;
    use crate::queue::{InMemoryMessageQueue, ReceiveRequest};

    #[tokio::test]
    async fn publish_sends_flat_json() {
        let backend = Arc::new(InMemoryMessageQueue::new());
        let publisher = EventPublisher::connect(backend.clone(), "IncidentsQueue")
            .await
            .unwrap();

        let incident = Incident {
            incident_id: IncidentId::from("INC42"),
            title: "Quote \"inside\"".into(),
            description: "line\nbreak".into(),
            status: "open".into(),
            creation_date: "2024-01-01T00:00:00Z".into(),
        };
        publisher
            .publish(&ChangeEvent::created(incident.clone()))
            .await
            .unwrap();

        let batch = backend
            .receive(publisher.queue(), ReceiveRequest::default())
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);

        let decoded = ChangeEvent::from_wire(&batch[0].body).unwrap();
        assert_eq!(decoded.incident, incident);
    }

    #[tokio::test]
    async fn connect_reuses_existing_queue() {
        let backend = Arc::new(InMemoryMessageQueue::new());
        EventPublisher::connect(backend.clone(), "IncidentsQueue")
            .await
            .unwrap();
        EventPublisher::connect(backend.clone(), "IncidentsQueue")
            .await
            .unwrap();
        assert_eq!(backend.queue_count().await, 1);
    }
}
