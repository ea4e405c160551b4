//! Core library for Beacon.
//!
//! Beacon keeps incident records in a keyed store and announces every
//! mutation on a message queue. This crate holds the store and queue
//! abstractions with their Postgres and in-memory backends, the event
//! publisher and consumer, and the [`IncidentService`] that ties them
//! together.
#![allow(missing_docs)]

/// Per-call cancellation and timeouts
pub mod context;

/// Error types for store, queue, provisioning and service failures
pub mod error;

/// Incident identifier minting
pub mod ids;

/// Idempotent resource provisioning helpers
pub mod provision;

/// Change-event queue backends and publisher
pub mod queue;

/// Incident record persistence
pub mod store;

/// Queue consumer loop and event handlers
pub mod consumer;

/// Incident lifecycle operations
pub mod service;

/// Migrations for the Postgres queue tables.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub use beacon_model as model;
pub use consumer::{
    BatchReport, ConsumerConfig, EventConsumer, EventHandler,
    LoggingEventHandler,
};
pub use context::CallContext;
pub use error::{
    HandlerError, IncidentError, ProvisionError, QueueError, Result,
    StoreError,
};
pub use provision::Provisioning;
pub use queue::{
    DEFAULT_QUEUE_NAME, EventPublisher, InMemoryMessageQueue, MessageQueue,
    PostgresMessageQueue, QueueHandle, ReceiveRequest, ReceivedMessage,
};
pub use service::{IncidentOperations, IncidentService, Notification, Recorded};
pub use store::{
    IncidentStore, InMemoryIncidentStore, PostgresIncidentStore,
    postgres::DEFAULT_INCIDENT_TABLE,
};
