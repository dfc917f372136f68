use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tokio::time::{sleep, Instant};

use super::WorkQueue;
use crate::error::QueueError;

/// Durable queue stored in the `work_queue` table of the article database.
///
/// Pop is a single `DELETE ... RETURNING` on the lowest sequence number, so two
/// consumers never receive the same entry.
#[derive(Debug, Clone)]
pub struct SqliteQueue {
    pool: SqlitePool,
    name: String,
    poll_interval: Duration,
}

impl SqliteQueue {
    /// The pool must already carry the store migrations.
    pub fn new(pool: SqlitePool, name: impl Into<String>) -> Self {
        Self {
            pool,
            name: name.into(),
            poll_interval: Duration::from_millis(200),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    async fn try_pop(&self) -> Result<Option<String>, QueueError> {
        let payload = sqlx::query_scalar(
            r"
            DELETE FROM work_queue
            WHERE seq = (SELECT MIN(seq) FROM work_queue WHERE queue = ?)
            RETURNING payload
            ",
        )
        .bind(&self.name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(payload)
    }
}

#[async_trait]
impl WorkQueue for SqliteQueue {
    async fn push(&self, payload: &str) -> Result<(), QueueError> {
        sqlx::query("INSERT INTO work_queue (queue, payload, enqueued_ms) VALUES (?, ?, ?)")
            .bind(&self.name)
            .bind(payload)
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<String>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(payload) = self.try_pop().await? {
                return Ok(Some(payload));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn len(&self) -> Result<u64, QueueError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM work_queue WHERE queue = ?")
            .bind(&self.name)
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }

    async fn contains(&self, payload: &str) -> Result<bool, QueueError> {
        let found: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM work_queue WHERE queue = ? AND payload = ?)",
        )
        .bind(&self.name)
        .bind(payload)
        .fetch_one(&self.pool)
        .await?;
        Ok(found)
    }

    async fn push_unique(&self, payload: &str) -> Result<bool, QueueError> {
        let inserted = sqlx::query(
            r"
            INSERT INTO work_queue (queue, payload, enqueued_ms)
            SELECT ?, ?, ?
            WHERE NOT EXISTS (SELECT 1 FROM work_queue WHERE queue = ? AND payload = ?)
            ",
        )
        .bind(&self.name)
        .bind(payload)
        .bind(Utc::now().timestamp_millis())
        .bind(&self.name)
        .bind(payload)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(inserted > 0)
    }
}
