use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use beacon_config::{Config, ConfigLoader, EnvConfig};
use beacon_core::{InMemoryIncidentStore, InMemoryMessageQueue, model::ChangeEvent};
use beacon_server::{
    AppState, create_app,
    handlers::incidents::{NOTIFICATION_ERROR_HEADER, NOTIFICATION_HEADER},
    infra::bootstrap::{self, BackendKind, Backends},
};
use serde_json::{Value, json};

const COLLECTION: &str = "/api/v1/incidents";

struct Harness {
    server: TestServer,
    store: Arc<InMemoryIncidentStore>,
    queue: Arc<InMemoryMessageQueue>,
    config: Config,
}

impl Harness {
    async fn events(&self) -> Vec<ChangeEvent> {
        self.queue
            .bodies(&self.config.queue.name)
            .await
            .iter()
            .map(|body| ChangeEvent::from_wire(body).expect("event body"))
            .collect()
    }
}

async fn harness() -> Harness {
    let config = ConfigLoader::new()
        .load_with_env(EnvConfig::default())
        .expect("default config")
        .config;

    let store = Arc::new(InMemoryIncidentStore::new());
    let queue = Arc::new(InMemoryMessageQueue::new());
    let backends = Backends {
        store: store.clone(),
        queue: queue.clone(),
        kind: BackendKind::InMemory,
    };

    let service = bootstrap::build_service(&backends, &config)
        .await
        .expect("service");
    let state = AppState::new(Arc::new(service), config.calls.per_call_timeout());
    let server = TestServer::new(create_app(state)).expect("test server");

    Harness {
        server,
        store,
        queue,
        config,
    }
}

fn item(id: &str) -> String {
    format!("{COLLECTION}/{id}")
}

async fn create(server: &TestServer, title: &str) -> Value {
    let response = server
        .post(COLLECTION)
        .json(&json!({
            "title": title,
            "description": "Smoke on level 2",
            "status": "open",
            "creationDate": "2025-01-01T00:00:00Z",
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json()
}

#[tokio::test]
async fn create_returns_the_stored_incident_and_announces_it() {
    let h = harness().await;

    let response = h
        .server
        .post(COLLECTION)
        .json(&json!({
            "title": "Fire alarm",
            "description": "Smoke on level 2",
            "creationDate": "2025-01-01T00:00:00Z",
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    assert_eq!(response.header(NOTIFICATION_HEADER), "published");
    let body: Value = response.json();
    let id = body["incidentId"].as_str().expect("incidentId");
    assert_eq!(body["status"], "open");
    assert!(!id.is_empty());
    assert_eq!(body["title"], "Fire alarm");
    assert_eq!(body["creationDate"], "2025-01-01T00:00:00Z");
    assert_eq!(h.store.len().await, 1);

    let events = h.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].operation.as_str(), "CREATE");
    assert_eq!(events[0].incident.incident_id.as_str(), id);
}

#[tokio::test]
async fn get_patch_delete_round_trip() {
    let h = harness().await;
    let created = create(&h.server, "Flood").await;
    let id = created["incidentId"].as_str().expect("incidentId");

    let fetched = h.server.get(&item(id)).await;
    fetched.assert_status_ok();
    assert_eq!(fetched.json::<Value>(), created);

    let patched = h
        .server
        .patch(&item(id))
        .json(&json!({ "status": "closed" }))
        .await;
    patched.assert_status_ok();
    let patched: Value = patched.json();
    assert_eq!(patched["status"], "closed");
    assert_eq!(patched["title"], "Flood");

    let deleted = h.server.delete(&item(id)).await;
    deleted.assert_status_ok();
    assert_eq!(deleted.json::<Value>(), json!({ "success": true }));

    h.server
        .get(&item(id))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let operations: Vec<_> = h
        .events()
        .await
        .iter()
        .map(|event| event.operation.as_str())
        .collect();
    assert_eq!(operations, ["CREATE", "UPDATE", "DELETE"]);
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn missing_incident_reports_not_found() {
    let h = harness().await;

    let response = h.server.get(&item("INC-missing")).await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"]["kind"], "not_found");
    assert_eq!(body["error"]["status"], 404);

    h.server
        .delete(&item("INC-missing"))
        .await
        .assert_status(StatusCode::NOT_FOUND);
    h.server
        .patch(&item("INC-missing"))
        .json(&json!({ "status": "closed" }))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    assert!(h.events().await.is_empty());
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let h = harness().await;

    let blank_title = h
        .server
        .post(COLLECTION)
        .json(&json!({ "title": "  ", "description": "d" }))
        .await;
    blank_title.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(blank_title.json::<Value>()["error"]["kind"], "invalid_request");

    h.server
        .post(COLLECTION)
        .json(&json!({ "description": "no title" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let created = create(&h.server, "Outage").await;
    let id = created["incidentId"].as_str().expect("incidentId");
    h.server
        .patch(&item(id))
        .json(&json!({ "status": "" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    assert_eq!(h.events().await.len(), 1);
}

#[tokio::test]
async fn store_outage_is_service_unavailable() {
    let h = harness().await;
    h.store.set_unavailable(true);

    let response = h
        .server
        .post(COLLECTION)
        .json(&json!({ "title": "t", "description": "d" }))
        .await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.json::<Value>()["error"]["kind"], "store_unavailable");
    assert!(h.events().await.is_empty());
}

#[tokio::test]
async fn publish_failure_still_returns_the_write() {
    let h = harness().await;
    h.queue.set_fail_sends(true);

    let response = h
        .server
        .post(COLLECTION)
        .json(&json!({ "title": "Power cut", "description": "Grid down" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    assert_eq!(response.header(NOTIFICATION_HEADER), "failed");
    assert!(response.maybe_header(NOTIFICATION_ERROR_HEADER).is_some());
    let body: Value = response.json();
    let id = body["incidentId"].as_str().expect("incidentId");

    let patched = h
        .server
        .patch(&item(id))
        .json(&json!({ "status": "closed" }))
        .await;
    patched.assert_status_ok();
    assert_eq!(patched.header(NOTIFICATION_HEADER), "failed");

    h.server.get(&item(id)).await.assert_status_ok();

    let deleted = h.server.delete(&item(id)).await;
    deleted.assert_status_ok();
    assert_eq!(deleted.header(NOTIFICATION_HEADER), "failed");

    assert!(h.events().await.is_empty());
}

#[tokio::test]
async fn health_reports_healthy() {
    let h = harness().await;

    let response = h.server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert!(body["timestamp"].is_string());
}
