//! Postgres-backed message queue.
//!
//! Delivery uses row locks with `SKIP LOCKED`, so any number of consumers can
//! poll the same queue without handing out a message twice inside one
//! visibility window.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    MessageId, MessageQueue, QueueHandle, ReceiptHandle, ReceiveRequest,
    ReceivedMessage,
};
use crate::{
    error::{ProvisionError, QueueError, QueueResult},
    provision::Provisioning,
};

const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Default delay between empty polls inside one long-poll window.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, FromRow)]
struct DeliveredRow {
    id: Uuid,
    receipt_handle: Uuid,
    body: String,
    receive_count: i32,
    created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct PostgresMessageQueue {
    pool: PgPool,
    poll_interval: Duration,
}

impl fmt::Debug for PostgresMessageQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresMessageQueue")
            .field("poll_interval", &self.poll_interval)
            .field("pool_size", &self.pool.size())
            .field("idle_connections", &self.pool.num_idle())
            .finish()
    }
}

impl PostgresMessageQueue {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies the queue migrations. Safe to run on every start.
    pub async fn initialize_schema(&self) -> Result<(), ProvisionError> {
        crate::MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| ProvisionError::new("message queue schema", e))
    }

    /// Number of live (not dead-lettered) messages on `queue`.
    pub async fn depth(&self, queue: &QueueHandle) -> QueueResult<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM beacon_messages \
             WHERE queue_name = $1 AND state = 'ready'",
        )
        .bind(queue.name())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| QueueError::Receive {
            queue: queue.name().to_string(),
            reason: e.to_string(),
        })
    }

    pub async fn dead_letter_count(
        &self,
        queue: &QueueHandle,
    ) -> QueueResult<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM beacon_messages \
             WHERE queue_name = $1 AND state = 'dead_letter'",
        )
        .bind(queue.name())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| QueueError::Receive {
            queue: queue.name().to_string(),
            reason: e.to_string(),
        })
    }

    async fn claim_visible(
        &self,
        queue: &QueueHandle,
        request: &ReceiveRequest,
    ) -> QueueResult<Vec<ReceivedMessage>> {
        let mut rows = sqlx::query_as::<_, DeliveredRow>(
            r#"
            WITH picked AS (
                SELECT id
                FROM beacon_messages
                WHERE queue_name = $1
                  AND state = 'ready'
                  AND visible_at <= NOW()
                ORDER BY created_at, id
                FOR UPDATE SKIP LOCKED
                LIMIT $2
            )
            UPDATE beacon_messages m
            SET receipt_handle = gen_random_uuid(),
                receive_count = m.receive_count + 1,
                visible_at = NOW() + make_interval(secs => $3),
                updated_at = NOW()
            FROM picked
            WHERE m.id = picked.id
            RETURNING m.id, m.receipt_handle, m.body, m.receive_count, m.created_at
            "#,
        )
        .bind(queue.name())
        .bind(request.max_messages as i64)
        .bind(request.visibility_timeout.as_secs_f64())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| QueueError::Receive {
            queue: queue.name().to_string(),
            reason: e.to_string(),
        })?;

        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        Ok(rows
            .into_iter()
            .map(|row| ReceivedMessage {
                message_id: MessageId(row.id),
                receipt: ReceiptHandle(row.receipt_handle),
                body: row.body,
                receive_count: u32::try_from(row.receive_count).unwrap_or(0),
            })
            .collect())
    }
}

#[async_trait]
impl MessageQueue for PostgresMessageQueue {
    async fn ensure_queue(
        &self,
        name: &str,
    ) -> Result<(QueueHandle, Provisioning), ProvisionError> {
        let resource = format!("queue {name}");
        if name.is_empty() {
            return Err(ProvisionError::new(resource, "queue name is empty"));
        }

        let inserted = sqlx::query(
            "INSERT INTO beacon_queues (name) VALUES ($1) \
             ON CONFLICT (name) DO NOTHING",
        )
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(|e| ProvisionError::new(&resource, e))?;

        let outcome = if inserted.rows_affected() == 1 {
            info!(queue = name, "queue created");
            Provisioning::Created
        } else {
            info!(queue = name, "queue already exists");
            Provisioning::Existing
        };
        Ok((QueueHandle::new(name), outcome))
    }

    async fn send(
        &self,
        queue: &QueueHandle,
        body: String,
    ) -> QueueResult<MessageId> {
        let id = MessageId::new();
        let result = sqlx::query(
            "INSERT INTO beacon_messages (id, queue_name, body) VALUES ($1, $2, $3)",
        )
        .bind(id.0)
        .bind(queue.name())
        .bind(&body)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(queue = %queue, message_id = %id, "message sent");
                Ok(id)
            }
            Err(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) =>
            {
                Err(QueueError::Publish {
                    queue: queue.name().to_string(),
                    reason: format!("queue {} does not exist", queue.name()),
                })
            }
            Err(e) => Err(QueueError::Publish {
                queue: queue.name().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn receive(
        &self,
        queue: &QueueHandle,
        request: ReceiveRequest,
    ) -> QueueResult<Vec<ReceivedMessage>> {
        let deadline = Instant::now() + request.wait_time;

        loop {
            let batch = self.claim_visible(queue, &request).await?;
            if !batch.is_empty() {
                return Ok(batch);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn delete(
        &self,
        queue: &QueueHandle,
        receipt: ReceiptHandle,
    ) -> QueueResult<()> {
        let result = sqlx::query(
            "DELETE FROM beacon_messages \
             WHERE queue_name = $1 AND receipt_handle = $2 AND state = 'ready'",
        )
        .bind(queue.name())
        .bind(receipt.0)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Acknowledge {
            queue: queue.name().to_string(),
            reason: e.to_string(),
        })?;

        if result.rows_affected() == 0 {
            return Err(QueueError::StaleReceipt(receipt.to_string()));
        }
        Ok(())
    }

    async fn dead_letter(
        &self,
        queue: &QueueHandle,
        receipt: ReceiptHandle,
        reason: &str,
    ) -> QueueResult<()> {
        let result = sqlx::query(
            "UPDATE beacon_messages \
             SET state = 'dead_letter', last_error = $3, updated_at = NOW() \
             WHERE queue_name = $1 AND receipt_handle = $2 AND state = 'ready'",
        )
        .bind(queue.name())
        .bind(receipt.0)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Acknowledge {
            queue: queue.name().to_string(),
            reason: e.to_string(),
        })?;

        if result.rows_affected() == 0 {
            return Err(QueueError::StaleReceipt(receipt.to_string()));
        }
        info!(queue = %queue, receipt = %receipt, reason, "message dead-lettered");
        Ok(())
    }
}
