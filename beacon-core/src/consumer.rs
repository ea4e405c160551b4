//! Queue consumer for incident change events.
//!
//! Each iteration long-polls the queue, hands every delivered event to an
//! [`EventHandler`] and deletes the messages that were handled. Anything not
//! deleted reappears once its visibility timeout lapses.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use beacon_model::ChangeEvent;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    error::{HandlerError, ProvisionError, QueueResult},
    queue::{MessageQueue, QueueHandle, ReceiveRequest, ReceivedMessage},
};

/// Reacts to one decoded change event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &ChangeEvent) -> Result<(), HandlerError>;
}

/// Prints each event to stdout and records it in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEventHandler;

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn handle(&self, event: &ChangeEvent) -> Result<(), HandlerError> {
        let incident = &event.incident;
        println!(
            "[{}] incident {} \"{}\" status={} created={}",
            event.operation,
            incident.incident_id,
            incident.title,
            incident.status,
            incident.creation_date
        );
        info!(
            operation = %event.operation,
            incident_id = %incident.incident_id,
            status = %incident.status,
            "change event received"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerConfig {
    pub max_messages: usize,
    pub wait_time: Duration,
    pub visibility_timeout: Duration,
    /// Deliveries beyond this count are dead-lettered instead of handled.
    /// `None` redelivers forever.
    pub max_receive_count: Option<u32>,
    /// Pause after a failed receive before polling again.
    pub error_backoff: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_messages: 10,
            wait_time: Duration::from_secs(5),
            visibility_timeout: Duration::from_secs(20),
            max_receive_count: None,
            error_backoff: Duration::from_secs(1),
        }
    }
}

impl ConsumerConfig {
    fn receive_request(&self) -> ReceiveRequest {
        ReceiveRequest {
            max_messages: self.max_messages,
            wait_time: self.wait_time,
            visibility_timeout: self.visibility_timeout,
        }
    }
}

/// Per-iteration counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub received: usize,
    pub processed: usize,
    pub deleted: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

impl BatchReport {
    fn absorb(&mut self, other: BatchReport) {
        self.received += other.received;
        self.processed += other.processed;
        self.deleted += other.deleted;
        self.failed += other.failed;
        self.dead_lettered += other.dead_lettered;
    }
}

enum Outcome {
    Deleted,
    HandledNotDeleted,
    Failed,
    DeadLettered,
}

pub struct EventConsumer {
    queue: Arc<dyn MessageQueue>,
    handle: QueueHandle,
    handler: Arc<dyn EventHandler>,
    config: ConsumerConfig,
}

impl fmt::Debug for EventConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventConsumer")
            .field("queue", &self.handle)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EventConsumer {
    /// Resolves (creating if needed) the queue to drain.
    pub async fn connect(
        queue: Arc<dyn MessageQueue>,
        queue_name: &str,
        handler: Arc<dyn EventHandler>,
        config: ConsumerConfig,
    ) -> Result<Self, ProvisionError> {
        let (handle, outcome) = queue.ensure_queue(queue_name).await?;
        info!(queue = %handle, provisioning = %outcome, "event consumer attached");
        Ok(Self {
            queue,
            handle,
            handler,
            config,
        })
    }

    pub fn queue(&self) -> &QueueHandle {
        &self.handle
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Runs a single poll and processes whatever it returned.
    pub async fn poll_once(&self) -> QueueResult<BatchReport> {
        let messages = self
            .queue
            .receive(&self.handle, self.config.receive_request())
            .await?;
        Ok(self.process_batch(messages).await)
    }

    /// Polls until `shutdown` is cancelled and returns the accumulated
    /// counters. A batch already received is always finished.
    pub async fn run(&self, shutdown: CancellationToken) -> BatchReport {
        info!(queue = %self.handle, "event consumer started");
        let mut totals = BatchReport::default();

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.queue.receive(&self.handle, self.config.receive_request()) => result,
            };

            match received {
                Ok(messages) if messages.is_empty() => {
                    debug!(queue = %self.handle, "no messages");
                }
                Ok(messages) => {
                    let report = self.process_batch(messages).await;
                    debug!(
                        queue = %self.handle,
                        received = report.received,
                        deleted = report.deleted,
                        failed = report.failed,
                        dead_lettered = report.dead_lettered,
                        "batch processed"
                    );
                    totals.absorb(report);
                }
                Err(err) => {
                    error!(queue = %self.handle, error = %err, "receive failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.error_backoff) => {}
                    }
                }
            }
        }

        info!(
            queue = %self.handle,
            processed = totals.processed,
            failed = totals.failed,
            "event consumer stopped"
        );
        totals
    }

    async fn process_batch(&self, messages: Vec<ReceivedMessage>) -> BatchReport {
        let mut report = BatchReport {
            received: messages.len(),
            ..BatchReport::default()
        };

        for message in messages {
            match self.process_message(&message).await {
                Outcome::Deleted => {
                    report.processed += 1;
                    report.deleted += 1;
                }
                Outcome::HandledNotDeleted => report.processed += 1,
                Outcome::Failed => report.failed += 1,
                Outcome::DeadLettered => report.dead_lettered += 1,
            }
        }
        report
    }

    async fn process_message(&self, message: &ReceivedMessage) -> Outcome {
        if let Some(limit) = self.config.max_receive_count
            && message.receive_count > limit
        {
            let reason = format!(
                "exceeded max receive count ({} > {limit})",
                message.receive_count
            );
            return match self
                .queue
                .dead_letter(&self.handle, message.receipt, &reason)
                .await
            {
                Ok(()) => {
                    warn!(
                        queue = %self.handle,
                        message_id = %message.message_id,
                        receive_count = message.receive_count,
                        "message dead-lettered"
                    );
                    Outcome::DeadLettered
                }
                Err(err) => {
                    warn!(
                        queue = %self.handle,
                        message_id = %message.message_id,
                        error = %err,
                        "dead-letter failed"
                    );
                    Outcome::Failed
                }
            };
        }

        let event = match ChangeEvent::from_wire(&message.body) {
            Ok(event) => event,
            Err(err) => {
                warn!(
                    queue = %self.handle,
                    message_id = %message.message_id,
                    receive_count = message.receive_count,
                    error = %err,
                    "undecodable message left for redelivery"
                );
                return Outcome::Failed;
            }
        };

        if let Err(err) = self.handler.handle(&event).await {
            warn!(
                queue = %self.handle,
                message_id = %message.message_id,
                incident_id = %event.incident.incident_id,
                receive_count = message.receive_count,
                error = %err,
                "handler failed; message left for redelivery"
            );
            return Outcome::Failed;
        }

        match self.queue.delete(&self.handle, message.receipt).await {
            Ok(()) => Outcome::Deleted,
            Err(err) => {
                warn!(
                    queue = %self.handle,
                    message_id = %message.message_id,
                    error = %err,
                    "handled message could not be deleted"
                );
                Outcome::HandledNotDeleted
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use beacon_model::{Incident, IncidentId};

    use super::*;
    use crate::queue::InMemoryMessageQueue;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<ChangeEvent>>,
        failures_left: AtomicUsize,
    }

    impl Recording {
        fn failing(times: usize) -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                failures_left: AtomicUsize::new(times),
            }
        }

        fn seen(&self) -> Vec<ChangeEvent> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventHandler for Recording {
        async fn handle(&self, event: &ChangeEvent) -> Result<(), HandlerError> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(HandlerError::new("downstream unavailable"));
            }
            self.seen.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn event(id: &str) -> ChangeEvent {
        ChangeEvent::created(Incident {
            incident_id: IncidentId::from(id),
            title: "Fire".into(),
            description: "Warehouse fire".into(),
            status: "open".into(),
            creation_date: "2024-01-01T00:00:00Z".into(),
        })
    }

    fn config() -> ConsumerConfig {
        ConsumerConfig {
            wait_time: Duration::ZERO,
            visibility_timeout: Duration::from_secs(20),
            ..ConsumerConfig::default()
        }
    }

    async fn consumer_with(
        handler: Arc<dyn EventHandler>,
        config: ConsumerConfig,
    ) -> (EventConsumer, Arc<InMemoryMessageQueue>) {
        let queue = Arc::new(InMemoryMessageQueue::new());
        let consumer =
            EventConsumer::connect(queue.clone(), "IncidentsQueue", handler, config)
                .await
                .unwrap();
        (consumer, queue)
    }

    #[tokio::test]
    async fn handled_messages_are_deleted() {
        let handler = Arc::new(Recording::default());
        let (consumer, queue) = consumer_with(handler.clone(), config()).await;
        for id in ["INC1", "INC2"] {
            queue
                .send(consumer.queue(), event(id).to_wire().unwrap())
                .await
                .unwrap();
        }

        let report = consumer.poll_once().await.unwrap();

        assert_eq!(report.received, 2);
        assert_eq!(report.deleted, 2);
        assert_eq!(handler.seen(), vec![event("INC1"), event("INC2")]);
        assert!(queue.bodies("IncidentsQueue").await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_messages_come_back_after_visibility_timeout() {
        let handler = Arc::new(Recording::failing(1));
        let (consumer, queue) = consumer_with(handler.clone(), config()).await;
        queue
            .send(consumer.queue(), event("INC1").to_wire().unwrap())
            .await
            .unwrap();

        let first = consumer.poll_once().await.unwrap();
        assert_eq!(first.failed, 1);
        assert_eq!(queue.bodies("IncidentsQueue").await.len(), 1);

        let hidden = consumer.poll_once().await.unwrap();
        assert_eq!(hidden.received, 0);

        tokio::time::advance(Duration::from_secs(21)).await;
        let retry = consumer.poll_once().await.unwrap();
        assert_eq!(retry.deleted, 1);
        assert_eq!(handler.seen(), vec![event("INC1")]);
    }

    #[tokio::test]
    async fn one_failure_does_not_block_the_batch() {
        let handler = Arc::new(Recording::default());
        let (consumer, queue) = consumer_with(handler.clone(), config()).await;
        queue
            .send(consumer.queue(), "not json".into())
            .await
            .unwrap();
        queue
            .send(consumer.queue(), event("INC2").to_wire().unwrap())
            .await
            .unwrap();

        let report = consumer.poll_once().await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(queue.bodies("IncidentsQueue").await, vec!["not json"]);
    }

    #[tokio::test(start_paused = true)]
    async fn poison_message_is_dead_lettered_when_bounded() {
        let handler = Arc::new(Recording::default());
        let config = ConsumerConfig {
            visibility_timeout: Duration::from_secs(1),
            max_receive_count: Some(2),
            ..config()
        };
        let (consumer, queue) = consumer_with(handler, config).await;
        queue
            .send(consumer.queue(), "garbage".into())
            .await
            .unwrap();

        for _ in 0..2 {
            let report = consumer.poll_once().await.unwrap();
            assert_eq!(report.failed, 1);
            tokio::time::advance(Duration::from_secs(2)).await;
        }

        let report = consumer.poll_once().await.unwrap();
        assert_eq!(report.dead_lettered, 1);
        assert!(queue.bodies("IncidentsQueue").await.is_empty());
        assert_eq!(queue.dead_letters("IncidentsQueue").await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let handler = Arc::new(Recording::default());
        let config = ConsumerConfig {
            wait_time: Duration::from_secs(5),
            ..ConsumerConfig::default()
        };
        let (consumer, queue) = consumer_with(handler.clone(), config).await;
        queue
            .send(consumer.queue(), event("INC1").to_wire().unwrap())
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        let consumer = Arc::new(consumer);
        let task = {
            let consumer = Arc::clone(&consumer);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { consumer.run(shutdown).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        shutdown.cancel();
        let totals = task.await.unwrap();

        assert_eq!(totals.deleted, 1);
        assert_eq!(handler.seen(), vec![event("INC1")]);
    }
}
