//! pgmq queue operations via direct SQLx, and the pgmq-backed [`TaskQueue`].
//!
//! Calls pgmq's SQL functions: pgmq.create, pgmq.send, pgmq.read,
//! pgmq.archive, pgmq.set_vt.

use std::sync::Arc;

use async_trait::async_trait;
use opentelemetry::KeyValue;

use super::Db;
use crate::error::{Error, Result};
use crate::queue::{Delivery, Task, TaskQueue};
use crate::telemetry::metrics;

/// A message read from a pgmq queue.
#[derive(Debug, Clone)]
pub struct PgmqMessage {
    pub msg_id: i64,
    pub read_ct: i32,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
    pub vt: chrono::DateTime<chrono::Utc>,
    pub message: serde_json::Value,
}

fn record_queue_operation(queue_name: &str, operation: &'static str) {
    metrics::queue_operations().add(
        1,
        &[
            KeyValue::new("queue", queue_name.to_string()),
            KeyValue::new("operation", operation),
        ],
    );
}

impl Db {
    /// Create a pgmq queue (idempotent).
    pub async fn create_queue(&self, queue_name: &str) -> Result<()> {
        sqlx::query("SELECT pgmq.create($1)")
            .bind(queue_name)
            .execute(&self.pool)
            .await?;
        record_queue_operation(queue_name, "create");
        Ok(())
    }

    /// Send a message to a pgmq queue. Returns the message ID.
    /// delay_seconds: 0 for immediate, >0 for delayed delivery.
    pub async fn send_to_queue(
        &self,
        queue_name: &str,
        payload: &serde_json::Value,
        delay_seconds: i32,
    ) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT pgmq.send($1, $2, $3)")
            .bind(queue_name)
            .bind(payload)
            .bind(delay_seconds)
            .fetch_one(&self.pool)
            .await?;
        record_queue_operation(queue_name, "send");
        Ok(row.0)
    }

    /// Read the next message from a queue (visibility timeout in seconds).
    /// Returns None if queue is empty.
    pub async fn read_from_queue(
        &self,
        queue_name: &str,
        vt_seconds: i32,
    ) -> Result<Option<PgmqMessage>> {
        let row = sqlx::query_as::<
            _,
            (
                i64,
                i32,
                chrono::DateTime<chrono::Utc>,
                chrono::DateTime<chrono::Utc>,
                serde_json::Value,
            ),
        >("SELECT msg_id, read_ct, enqueued_at, vt, message FROM pgmq.read($1, $2, 1)")
        .bind(queue_name)
        .bind(vt_seconds)
        .fetch_optional(&self.pool)
        .await?;

        let msg = row.map(|(msg_id, read_ct, enqueued_at, vt, message)| PgmqMessage {
            msg_id,
            read_ct,
            enqueued_at,
            vt,
            message,
        });

        record_queue_operation(
            queue_name,
            if msg.is_some() { "read" } else { "read_empty" },
        );
        Ok(msg)
    }

    /// Archive a message (moves to archive table, preserves for audit).
    pub async fn archive_message(&self, queue_name: &str, msg_id: i64) -> Result<()> {
        sqlx::query("SELECT pgmq.archive($1, $2)")
            .bind(queue_name)
            .bind(msg_id)
            .execute(&self.pool)
            .await?;
        record_queue_operation(queue_name, "archive");
        Ok(())
    }

    /// Make a read message visible again after `vt_seconds`.
    pub async fn set_visibility_timeout(
        &self,
        queue_name: &str,
        msg_id: i64,
        vt_seconds: i32,
    ) -> Result<()> {
        sqlx::query("SELECT pgmq.set_vt($1, $2, $3)")
            .bind(queue_name)
            .bind(msg_id)
            .bind(vt_seconds)
            .execute(&self.pool)
            .await?;
        record_queue_operation(queue_name, "set_vt");
        Ok(())
    }
}

/// [`TaskQueue`] over a pgmq queue. A read hides the message for the
/// visibility timeout; unacked messages reappear after it.
pub struct PgmqQueue {
    db: Arc<Db>,
    queue_name: String,
    visibility_timeout: i32,
    retry_delay: i32,
}

impl PgmqQueue {
    pub fn new(db: Arc<Db>, queue_name: impl Into<String>, visibility_timeout: i32) -> Self {
        Self {
            db,
            queue_name: queue_name.into(),
            visibility_timeout,
            retry_delay: 5,
        }
    }

    /// Delay before a retried delivery becomes visible again.
    pub fn retry_delay(mut self, seconds: i32) -> Self {
        self.retry_delay = seconds;
        self
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }
}

#[async_trait]
impl TaskQueue for PgmqQueue {
    async fn enqueue(&self, task: &Task) -> Result<()> {
        let payload = serde_json::to_value(task)?;
        self.db.send_to_queue(&self.queue_name, &payload, 0).await?;
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Delivery>> {
        let Some(msg) = self
            .db
            .read_from_queue(&self.queue_name, self.visibility_timeout)
            .await?
        else {
            return Ok(None);
        };

        let task: Task = match serde_json::from_value(msg.message) {
            Ok(task) => task,
            Err(e) => {
                // Undecodable payloads would otherwise reappear forever.
                self.db.archive_message(&self.queue_name, msg.msg_id).await?;
                return Err(Error::Other(format!(
                    "archived undecodable message {}: {e}",
                    msg.msg_id
                )));
            }
        };
        Ok(Some(Delivery {
            id: msg.msg_id,
            read_count: msg.read_ct,
            task,
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.db.archive_message(&self.queue_name, delivery.id).await
    }

    async fn retry(&self, delivery: Delivery) -> Result<()> {
        self.db
            .set_visibility_timeout(&self.queue_name, delivery.id, self.retry_delay)
            .await
    }
}
