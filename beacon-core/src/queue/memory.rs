use std::{
    collections::HashMap,
    fmt,
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use tokio::{
    sync::{Mutex, Notify},
    time::Instant,
};

use super::{
    MessageId, MessageQueue, QueueHandle, ReceiptHandle, ReceiveRequest,
    ReceivedMessage,
};
use crate::{
    error::{ProvisionError, QueueError, QueueResult},
    provision::Provisioning,
};

#[derive(Debug, Clone)]
struct StoredMessage {
    id: MessageId,
    body: String,
    visible_at: Instant,
    receipt: Option<ReceiptHandle>,
    receive_count: u32,
}

/// A message parked by [`MessageQueue::dead_letter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub message_id: MessageId,
    pub body: String,
    pub reason: String,
    pub receive_count: u32,
}

#[derive(Debug, Default)]
struct QueueState {
    messages: Vec<StoredMessage>,
    dead_letters: Vec<DeadLetter>,
}

/// Process-local queue with the same visibility semantics as the Postgres
/// backend. Deadlines follow tokio's clock, so paused-time tests can drive
/// redelivery deterministically.
#[derive(Default)]
pub struct InMemoryMessageQueue {
    queues: Mutex<HashMap<String, QueueState>>,
    arrivals: Notify,
    fail_sends: AtomicBool,
}

impl fmt::Debug for InMemoryMessageQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryMessageQueue")
            .field(
                "queues",
                &self.queues.try_lock().map(|q| q.len()).unwrap_or_default(),
            )
            .field("fail_sends", &self.fail_sends.load(Ordering::Relaxed))
            .finish()
    }
}

impl InMemoryMessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `send` fail while set.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub async fn queue_count(&self) -> usize {
        self.queues.lock().await.len()
    }

    /// Bodies of all live messages on `queue`, in send order, regardless of
    /// visibility.
    pub async fn bodies(&self, queue: &str) -> Vec<String> {
        self.queues
            .lock()
            .await
            .get(queue)
            .map(|state| state.messages.iter().map(|m| m.body.clone()).collect())
            .unwrap_or_default()
    }

    pub async fn dead_letters(&self, queue: &str) -> Vec<DeadLetter> {
        self.queues
            .lock()
            .await
            .get(queue)
            .map(|state| state.dead_letters.clone())
            .unwrap_or_default()
    }

    fn missing_queue(queue: &QueueHandle) -> String {
        format!("queue {} does not exist", queue.name())
    }
}

#[async_trait]
impl MessageQueue for InMemoryMessageQueue {
    async fn ensure_queue(
        &self,
        name: &str,
    ) -> Result<(QueueHandle, Provisioning), ProvisionError> {
        if name.is_empty() {
            return Err(ProvisionError::new("queue", "queue name is empty"));
        }
        let mut queues = self.queues.lock().await;
        let outcome = if queues.contains_key(name) {
            Provisioning::Existing
        } else {
            queues.insert(name.to_string(), QueueState::default());
            Provisioning::Created
        };
        Ok((QueueHandle::new(name), outcome))
    }

    async fn send(
        &self,
        queue: &QueueHandle,
        body: String,
    ) -> QueueResult<MessageId> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(QueueError::Publish {
                queue: queue.name().to_string(),
                reason: "in-memory queue rejecting sends".into(),
            });
        }

        let mut queues = self.queues.lock().await;
        let state =
            queues
                .get_mut(queue.name())
                .ok_or_else(|| QueueError::Publish {
                    queue: queue.name().to_string(),
                    reason: Self::missing_queue(queue),
                })?;

        let id = MessageId::new();
        state.messages.push(StoredMessage {
            id,
            body,
            visible_at: Instant::now(),
            receipt: None,
            receive_count: 0,
        });
        drop(queues);

        self.arrivals.notify_waiters();
        Ok(id)
    }

    async fn receive(
        &self,
        queue: &QueueHandle,
        request: ReceiveRequest,
    ) -> QueueResult<Vec<ReceivedMessage>> {
        let deadline = Instant::now() + request.wait_time;

        loop {
            let arrival = self.arrivals.notified();
            tokio::pin!(arrival);
            arrival.as_mut().enable();

            let next_wake = {
                let mut queues = self.queues.lock().await;
                let state = queues.get_mut(queue.name()).ok_or_else(|| {
                    QueueError::Receive {
                        queue: queue.name().to_string(),
                        reason: Self::missing_queue(queue),
                    }
                })?;

                let now = Instant::now();
                let mut batch = Vec::new();
                for message in state.messages.iter_mut() {
                    if batch.len() >= request.max_messages {
                        break;
                    }
                    if message.visible_at > now {
                        continue;
                    }
                    let receipt = ReceiptHandle::new();
                    message.receipt = Some(receipt);
                    message.receive_count += 1;
                    message.visible_at = now + request.visibility_timeout;
                    batch.push(ReceivedMessage {
                        message_id: message.id,
                        receipt,
                        body: message.body.clone(),
                        receive_count: message.receive_count,
                    });
                }

                if !batch.is_empty() {
                    return Ok(batch);
                }
                if now >= deadline {
                    return Ok(Vec::new());
                }

                state
                    .messages
                    .iter()
                    .map(|m| m.visible_at)
                    .filter(|at| *at > now)
                    .min()
                    .map_or(deadline, |at| at.min(deadline))
            };

            tokio::select! {
                _ = &mut arrival => {}
                _ = tokio::time::sleep_until(next_wake) => {}
            }
        }
    }

    async fn delete(
        &self,
        queue: &QueueHandle,
        receipt: ReceiptHandle,
    ) -> QueueResult<()> {
        let mut queues = self.queues.lock().await;
        let state =
            queues
                .get_mut(queue.name())
                .ok_or_else(|| QueueError::Acknowledge {
                    queue: queue.name().to_string(),
                    reason: Self::missing_queue(queue),
                })?;

        let position = state
            .messages
            .iter()
            .position(|m| m.receipt == Some(receipt))
            .ok_or_else(|| QueueError::StaleReceipt(receipt.to_string()))?;
        state.messages.remove(position);
        Ok(())
    }

    async fn dead_letter(
        &self,
        queue: &QueueHandle,
        receipt: ReceiptHandle,
        reason: &str,
    ) -> QueueResult<()> {
        let mut queues = self.queues.lock().await;
        let state =
            queues
                .get_mut(queue.name())
                .ok_or_else(|| QueueError::Acknowledge {
                    queue: queue.name().to_string(),
                    reason: Self::missing_queue(queue),
                })?;

        let position = state
            .messages
            .iter()
            .position(|m| m.receipt == Some(receipt))
            .ok_or_else(|| QueueError::StaleReceipt(receipt.to_string()))?;
        let message = state.messages.remove(position);
        state.dead_letters.push(DeadLetter {
            message_id: message.id,
            body: message.body,
            reason: reason.to_string(),
            receive_count: message.receive_count,
        });
        Ok(())
    }
}
