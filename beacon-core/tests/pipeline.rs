//! End-to-end flows over the in-memory backends: service writes, the
//! publisher announces, the consumer drains.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use beacon_core::{
    CallContext, ConsumerConfig, EventConsumer, EventHandler, EventPublisher,
    HandlerError, InMemoryIncidentStore, InMemoryMessageQueue, IncidentError,
    IncidentOperations, IncidentService, IncidentStore, MessageQueue,
    ReceiveRequest,
    model::{ChangeEvent, ChangeOperation, IncidentId, NewIncident, StatusUpdate},
};
use serde_json::Value;

struct Harness {
    service: IncidentService,
    store: Arc<InMemoryIncidentStore>,
    queue: Arc<InMemoryMessageQueue>,
}

async fn harness() -> anyhow::Result<Harness> {
    let store = Arc::new(InMemoryIncidentStore::new());
    store.ensure_table().await?;
    let queue = Arc::new(InMemoryMessageQueue::new());
    let publisher = EventPublisher::connect(queue.clone(), "IncidentsQueue").await?;
    Ok(Harness {
        service: IncidentService::new(store.clone(), publisher),
        store,
        queue,
    })
}

fn peek_request() -> ReceiveRequest {
    ReceiveRequest {
        max_messages: 10,
        wait_time: Duration::ZERO,
        visibility_timeout: Duration::from_secs(20),
    }
}

async fn published(queue: &InMemoryMessageQueue) -> anyhow::Result<Vec<ChangeEvent>> {
    queue
        .bodies("IncidentsQueue")
        .await
        .iter()
        .map(|body| ChangeEvent::from_wire(body).map_err(anyhow::Error::from))
        .collect()
}

fn fire() -> NewIncident {
    NewIncident::new("Fire", "Warehouse fire", "open", "2024-01-01T00:00:00Z")
}

#[tokio::test]
async fn create_then_get_round_trips_fields() -> anyhow::Result<()> {
    let h = harness().await?;
    let ctx = CallContext::background();

    let created = h.service.create_incident(&ctx, fire()).await?.into_inner();
    assert!(created.incident_id.as_str().starts_with("INC"));

    let fetched = h.service.get_incident(&ctx, &created.incident_id).await?;
    assert_eq!(fetched, created);
    assert_eq!(fetched.title, "Fire");
    assert_eq!(fetched.description, "Warehouse fire");
    assert_eq!(fetched.status, "open");
    assert_eq!(fetched.creation_date, "2024-01-01T00:00:00Z");

    assert_eq!(published(&h.queue).await?, vec![ChangeEvent::created(created)]);
    Ok(())
}

#[tokio::test]
async fn event_body_is_flat_string_map() -> anyhow::Result<()> {
    let h = harness().await?;
    h.service
        .create_incident(&CallContext::background(), fire())
        .await?;

    let bodies = h.queue.bodies("IncidentsQueue").await;
    let value: Value = serde_json::from_str(&bodies[0])?;
    let object = value.as_object().expect("json object");

    let mut keys: Vec<_> = object.keys().cloned().collect();
    keys.sort();
    assert_eq!(
        keys,
        ["creationDate", "description", "incidentId", "operation", "status", "title"]
    );
    assert!(object.values().all(Value::is_string));
    assert_eq!(object["operation"], "CREATE");
    Ok(())
}

#[tokio::test]
async fn update_changes_only_status_and_announces_it() -> anyhow::Result<()> {
    let h = harness().await?;
    let ctx = CallContext::background();
    let created = h.service.create_incident(&ctx, fire()).await?.into_inner();

    let updated = h
        .service
        .update_incident(
            &ctx,
            &created.incident_id,
            StatusUpdate {
                status: "closed".into(),
            },
        )
        .await?;
    assert!(updated.notification.is_published());

    let fetched = h.service.get_incident(&ctx, &created.incident_id).await?;
    assert_eq!(fetched, created.with_status("closed"));

    let events = published(&h.queue).await?;
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].operation, ChangeOperation::Update);
    assert_eq!(events[1].incident.status, "closed");
    assert_eq!(events[1].incident.title, "Fire");
    Ok(())
}

#[tokio::test]
async fn delete_then_get_is_not_found() -> anyhow::Result<()> {
    let h = harness().await?;
    let ctx = CallContext::background();
    let created = h.service.create_incident(&ctx, fire()).await?.into_inner();

    h.service.delete_incident(&ctx, &created.incident_id).await?;

    let err = h
        .service
        .get_incident(&ctx, &created.incident_id)
        .await
        .unwrap_err();
    assert!(matches!(err, IncidentError::NotFound(_)));

    let events = published(&h.queue).await?;
    assert_eq!(
        events.iter().map(|e| e.operation).collect::<Vec<_>>(),
        [ChangeOperation::Create, ChangeOperation::Delete]
    );
    assert_eq!(events[1].incident, created);
    Ok(())
}

#[tokio::test]
async fn missing_ids_publish_nothing() -> anyhow::Result<()> {
    let h = harness().await?;
    let ctx = CallContext::background();
    let unknown = IncidentId::from("unknown-id");

    let err = h.service.delete_incident(&ctx, &unknown).await.unwrap_err();
    assert!(matches!(err, IncidentError::NotFound(_)));

    let err = h
        .service
        .update_incident(&ctx, &unknown, StatusUpdate { status: "closed".into() })
        .await
        .unwrap_err();
    assert!(matches!(err, IncidentError::NotFound(_)));

    assert!(published(&h.queue).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn store_outage_is_retryable_and_silent() -> anyhow::Result<()> {
    let h = harness().await?;
    h.store.set_unavailable(true);

    let err = h
        .service
        .create_incident(&CallContext::background(), fire())
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(err, IncidentError::Store(_)));
    assert!(published(&h.queue).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn publish_failure_still_persists_record() -> anyhow::Result<()> {
    let h = harness().await?;
    h.queue.set_fail_sends(true);
    let ctx = CallContext::background();

    let recorded = h.service.create_incident(&ctx, fire()).await?;
    assert!(!recorded.notification.is_published());

    let fetched = h.service.get_incident(&ctx, &recorded.value.incident_id).await?;
    assert_eq!(fetched, recorded.value);
    assert_eq!(h.store.len().await, 1);
    Ok(())
}

#[derive(Default)]
struct Collect(Mutex<Vec<ChangeEvent>>);

#[async_trait]
impl EventHandler for Collect {
    async fn handle(&self, event: &ChangeEvent) -> Result<(), HandlerError> {
        self.0
            .lock()
            .map_err(|_| HandlerError::new("poisoned"))?
            .push(event.clone());
        Ok(())
    }
}

#[tokio::test]
async fn consumer_drains_what_the_service_published() -> anyhow::Result<()> {
    let h = harness().await?;
    let ctx = CallContext::background();
    let created = h.service.create_incident(&ctx, fire()).await?.into_inner();
    h.service
        .update_incident(
            &ctx,
            &created.incident_id,
            StatusUpdate {
                status: "in-progress".into(),
            },
        )
        .await?;

    let handler = Arc::new(Collect::default());
    let consumer = EventConsumer::connect(
        h.queue.clone(),
        "IncidentsQueue",
        handler.clone(),
        ConsumerConfig {
            wait_time: Duration::ZERO,
            ..ConsumerConfig::default()
        },
    )
    .await?;

    let report = consumer.poll_once().await?;
    assert_eq!(report.received, 2);
    assert_eq!(report.deleted, 2);

    let seen = handler.0.lock().expect("lock").clone();
    assert_eq!(seen[0].operation, ChangeOperation::Create);
    assert_eq!(seen[1].incident.status, "in-progress");

    let (handle, _) = h.queue.ensure_queue("IncidentsQueue").await?;
    assert!(h.queue.receive(&handle, peek_request()).await?.is_empty());
    Ok(())
}
