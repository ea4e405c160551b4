//! Message queue abstraction with visibility-timeout delivery.
//!
//! A received message stays hidden from other receivers until its visibility
//! deadline passes. Deleting it with the receipt handle of the current
//! delivery acknowledges it; letting the deadline lapse makes it eligible for
//! redelivery.

pub mod memory;
pub mod postgres;
pub mod publisher;

use std::{fmt, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{ProvisionError, QueueResult},
    provision::Provisioning,
};

pub use memory::InMemoryMessageQueue;
pub use postgres::PostgresMessageQueue;
pub use publisher::EventPublisher;

/// Default queue carrying incident change events.
pub const DEFAULT_QUEUE_NAME: &str = "IncidentsQueue";

/// Resolved reference to a provisioned queue.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueHandle {
    name: String,
}

impl QueueHandle {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for QueueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Token identifying one delivery of a message. A new one is issued on every
/// receive, so a consumer whose visibility window lapsed cannot acknowledge a
/// delivery that now belongs to someone else.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ReceiptHandle(pub Uuid);

impl Default for ReceiptHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiptHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message handed to a receiver together with its delivery receipt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    pub receipt: ReceiptHandle,
    pub body: String,
    /// Number of times this message has been delivered, including this one.
    pub receive_count: u32,
}

/// Parameters for a single long-poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReceiveRequest {
    pub max_messages: usize,
    /// Upper bound on how long the call waits for a message to arrive.
    pub wait_time: Duration,
    /// How long returned messages stay hidden from other receivers.
    pub visibility_timeout: Duration,
}

impl Default for ReceiveRequest {
    fn default() -> Self {
        Self {
            max_messages: 10,
            wait_time: Duration::from_secs(5),
            visibility_timeout: Duration::from_secs(20),
        }
    }
}

/// Queue backend consumed by the publisher and the event consumer.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Returns the named queue, creating it on first use. Repeated calls are
    /// side-effect free.
    async fn ensure_queue(
        &self,
        name: &str,
    ) -> Result<(QueueHandle, Provisioning), ProvisionError>;

    async fn send(&self, queue: &QueueHandle, body: String)
    -> QueueResult<MessageId>;

    /// Long-polls for up to `request.wait_time` and returns between zero and
    /// `request.max_messages` visible messages.
    async fn receive(
        &self,
        queue: &QueueHandle,
        request: ReceiveRequest,
    ) -> QueueResult<Vec<ReceivedMessage>>;

    /// Acknowledges a delivery, removing the message permanently.
    async fn delete(
        &self,
        queue: &QueueHandle,
        receipt: ReceiptHandle,
    ) -> QueueResult<()>;

    /// Parks a delivery in the dead-letter state so it is never redelivered.
    async fn dead_letter(
        &self,
        queue: &QueueHandle,
        receipt: ReceiptHandle,
        reason: &str,
    ) -> QueueResult<()>;
}
