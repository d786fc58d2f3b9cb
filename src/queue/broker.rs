//! Durable task queue stored in an SQL database.
//!
//! Messages are rows of `task_queue`. A consumer claims a row by stamping it
//! with a claim token and time; the row stays invisible to other consumers
//! until it is acked (deleted), nacked (claim cleared or dead-lettered) or
//! its lease runs out.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::datetime::now_db_string;
use crate::db::{connect_pool, DbPool};
use crate::{NewsaggError, Result};

#[cfg(feature = "sqlite")]
const DECLARE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS task_queue (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    queue_name      TEXT NOT NULL,
    body            TEXT NOT NULL,
    delivery_count  INTEGER NOT NULL DEFAULT 0,
    claimed_at      INTEGER,
    claimed_by      TEXT,
    dead_at         TEXT,
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_task_queue_ready ON task_queue(queue_name, dead_at, claimed_at, id);
"#;

#[cfg(feature = "postgres")]
const DECLARE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS task_queue (
    id              BIGSERIAL PRIMARY KEY,
    queue_name      TEXT NOT NULL,
    body            TEXT NOT NULL,
    delivery_count  BIGINT NOT NULL DEFAULT 0,
    claimed_at      BIGINT,
    claimed_by      TEXT,
    dead_at         TEXT,
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_task_queue_ready ON task_queue(queue_name, dead_at, claimed_at, id);
"#;

#[cfg(feature = "sqlite")]
const CLAIM_SQL: &str = r#"
UPDATE task_queue
SET claimed_at = $1, claimed_by = $2, delivery_count = delivery_count + 1
WHERE id = (
    SELECT id FROM task_queue
    WHERE queue_name = $3
      AND dead_at IS NULL
      AND (claimed_at IS NULL OR claimed_at < $4)
      AND delivery_count < $5
    ORDER BY id
    LIMIT 1
)
RETURNING id, body, delivery_count
"#;

#[cfg(feature = "postgres")]
const CLAIM_SQL: &str = r#"
UPDATE task_queue
SET claimed_at = $1, claimed_by = $2, delivery_count = delivery_count + 1
WHERE id = (
    SELECT id FROM task_queue
    WHERE queue_name = $3
      AND dead_at IS NULL
      AND (claimed_at IS NULL OR claimed_at < $4)
      AND delivery_count < $5
    ORDER BY id
    LIMIT 1
    FOR UPDATE SKIP LOCKED
)
RETURNING id, body, delivery_count
"#;

/// Retire messages whose last allowed delivery expired without being settled.
const EXPIRE_EXHAUSTED_SQL: &str = r#"
UPDATE task_queue
SET dead_at = $1, claimed_at = NULL, claimed_by = NULL
WHERE queue_name = $2
  AND dead_at IS NULL
  AND delivery_count >= $3
  AND claimed_at IS NOT NULL
  AND claimed_at < $4
"#;

fn queue_error(e: sqlx::Error) -> NewsaggError {
    NewsaggError::Queue(e.to_string())
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Handle to one named durable queue.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct TaskQueue {
    pool: DbPool,
    name: String,
    lease: Duration,
    max_deliveries: Option<u32>,
}

impl TaskQueue {
    /// Connect to the queue store named by `config.url`.
    ///
    /// Does not create the queue; call [`declare`](Self::declare) first.
    pub async fn connect(config: &QueueConfig) -> Result<Self> {
        // one connection per consumer worker plus one for the producer
        let max_connections = (config.workers as u32).saturating_add(1);
        let pool = connect_pool(&config.url, max_connections)
            .await
            .map_err(|e| NewsaggError::Queue(format!("cannot reach queue store: {e}")))?;

        Ok(Self {
            pool,
            name: config.name.clone(),
            lease: Duration::from_secs(config.lease_secs),
            max_deliveries: config.max_deliveries,
        })
    }

    /// Queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create the queue storage if it does not exist. Idempotent.
    pub async fn declare(&self) -> Result<()> {
        sqlx::raw_sql(DECLARE_SQL)
            .execute(&self.pool)
            .await
            .map_err(queue_error)?;
        debug!(queue = %self.name, "Queue declared");
        Ok(())
    }

    /// Append a persistent message.
    pub async fn publish(&self, body: &str) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO task_queue (queue_name, body, created_at) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(self.name.clone())
        .bind(body.to_string())
        .bind(now_db_string())
        .fetch_one(&self.pool)
        .await
        .map_err(queue_error)?;

        debug!(queue = %self.name, delivery = id, "Message published");
        Ok(id)
    }

    /// Claim the oldest deliverable message, if any.
    ///
    /// Deliverable means not dead-lettered, below the delivery cap, and either
    /// never claimed or claimed longer ago than the lease. Messages whose
    /// final delivery lease ran out are dead-lettered first.
    pub async fn claim(&self) -> Result<Option<Delivery>> {
        let now = now_millis();
        let lease_cutoff = now - self.lease.as_millis() as i64;
        let token = Uuid::new_v4().to_string();

        let cap = match self.max_deliveries {
            Some(max) => {
                self.expire_exhausted(max, lease_cutoff).await?;
                i64::from(max)
            }
            None => i64::MAX,
        };

        let row: Option<(i64, String, i64)> = sqlx::query_as(CLAIM_SQL)
            .bind(now)
            .bind(token.clone())
            .bind(self.name.clone())
            .bind(lease_cutoff)
            .bind(cap)
            .fetch_optional(&self.pool)
            .await
            .map_err(queue_error)?;

        Ok(row.map(|(id, body, delivery_count)| Delivery {
            queue: self.clone(),
            id,
            body,
            delivery_count: delivery_count.max(0) as u32,
            token,
        }))
    }

    async fn expire_exhausted(&self, max_deliveries: u32, lease_cutoff: i64) -> Result<()> {
        let result = sqlx::query(EXPIRE_EXHAUSTED_SQL)
            .bind(now_db_string())
            .bind(self.name.clone())
            .bind(i64::from(max_deliveries))
            .bind(lease_cutoff)
            .execute(&self.pool)
            .await
            .map_err(queue_error)?;

        if result.rows_affected() > 0 {
            warn!(
                queue = %self.name,
                count = result.rows_affected(),
                "Dead-lettered messages abandoned on their last delivery"
            );
        }
        Ok(())
    }

    /// Messages not yet acked and not dead-lettered, claimed or not.
    pub async fn len(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM task_queue WHERE queue_name = $1 AND dead_at IS NULL",
        )
        .bind(self.name.clone())
        .fetch_one(&self.pool)
        .await
        .map_err(queue_error)?;
        Ok(count)
    }

    /// Whether no live message remains.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Messages that exhausted their deliveries.
    pub async fn dead_letter_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM task_queue WHERE queue_name = $1 AND dead_at IS NOT NULL",
        )
        .bind(self.name.clone())
        .fetch_one(&self.pool)
        .await
        .map_err(queue_error)?;
        Ok(count)
    }

    /// Close the underlying pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("name", &self.name)
            .field("lease", &self.lease)
            .field("max_deliveries", &self.max_deliveries)
            .finish()
    }
}

/// What a nack did with the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackOutcome {
    /// Back in the queue for another delivery.
    Requeued,
    /// Retained as a dead letter; never delivered again.
    DeadLettered,
    /// The claim had already expired and been taken over; nothing changed.
    LeaseLost,
}

/// A claimed message. Must be settled with [`ack`](Self::ack) or
/// [`nack`](Self::nack); an unsettled delivery is redelivered after the lease.
#[derive(Debug)]
pub struct Delivery {
    queue: TaskQueue,
    id: i64,
    body: String,
    delivery_count: u32,
    token: String,
}

impl Delivery {
    /// Message id.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Message body.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// How many times this message has been delivered, this delivery included.
    pub fn delivery_count(&self) -> u32 {
        self.delivery_count
    }

    /// Remove the message from the queue. Returns `false` if the lease had
    /// expired and another consumer owns the message now.
    pub async fn ack(self) -> Result<bool> {
        let result = sqlx::query("DELETE FROM task_queue WHERE id = $1 AND claimed_by = $2")
            .bind(self.id)
            .bind(self.token.clone())
            .execute(&self.queue.pool)
            .await
            .map_err(queue_error)?;

        if result.rows_affected() == 0 {
            warn!(delivery = self.id, "Ack after lease expiry, message owned elsewhere");
            return Ok(false);
        }
        Ok(true)
    }

    /// Give the message back.
    ///
    /// With `requeue` the message becomes deliverable again, unless it has
    /// reached the configured delivery cap, in which case it is dead-lettered.
    /// Without `requeue` it is dead-lettered directly.
    pub async fn nack(self, requeue: bool) -> Result<NackOutcome> {
        let exhausted = self
            .queue
            .max_deliveries
            .is_some_and(|max| self.delivery_count >= max);

        let (sql, outcome) = if requeue && !exhausted {
            (
                "UPDATE task_queue SET claimed_at = NULL, claimed_by = NULL \
                 WHERE id = $1 AND claimed_by = $2",
                NackOutcome::Requeued,
            )
        } else {
            (
                "UPDATE task_queue SET dead_at = $3, claimed_at = NULL, claimed_by = NULL \
                 WHERE id = $1 AND claimed_by = $2",
                NackOutcome::DeadLettered,
            )
        };

        let mut query = sqlx::query(sql).bind(self.id).bind(self.token.clone());
        if outcome == NackOutcome::DeadLettered {
            query = query.bind(now_db_string());
        }
        let result = query
            .execute(&self.queue.pool)
            .await
            .map_err(queue_error)?;

        if result.rows_affected() == 0 {
            warn!(delivery = self.id, "Nack after lease expiry, message owned elsewhere");
            return Ok(NackOutcome::LeaseLost);
        }

        if outcome == NackOutcome::DeadLettered {
            info!(
                queue = %self.queue.name,
                delivery = self.id,
                deliveries = self.delivery_count,
                "Message dead-lettered"
            );
        }
        Ok(outcome)
    }
}
