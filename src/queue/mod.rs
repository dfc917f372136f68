//! Work Queue: ordered, at-least-once FIFO of article ids awaiting
//! normalization.
//!
//! There is no ack step. An entry is gone once popped; redelivery happens
//! only when the consumer pushes it back or the reconciliation sweep finds
//! the article still non-terminal.

pub mod memory;
pub mod sqlite;

use std::time::Duration;

use async_trait::async_trait;

use crate::article::ArticleId;
use crate::error::QueueError;

pub use memory::MemoryQueue;
pub use sqlite::SqliteQueue;

/// Name of the normalization queue.
pub const TRANSFORM_QUEUE: &str = "zennews:queue:transform";

#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Append a raw payload to the tail.
    async fn push(&self, payload: &str) -> Result<(), QueueError>;

    /// Block until an entry is available or `timeout` elapses.
    async fn pop(&self, timeout: Duration) -> Result<Option<String>, QueueError>;

    /// Current backlog size.
    async fn len(&self) -> Result<u64, QueueError>;

    /// Whether `payload` is waiting in the queue.
    async fn contains(&self, payload: &str) -> Result<bool, QueueError>;

    /// Push `payload` unless an identical entry is already waiting. Returns
    /// whether it was pushed. Backends override this to make it atomic.
    async fn push_unique(&self, payload: &str) -> Result<bool, QueueError> {
        if self.contains(payload).await? {
            return Ok(false);
        }
        self.push(payload).await?;
        Ok(true)
    }

    async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len().await? == 0)
    }

    async fn enqueue(&self, id: ArticleId) -> Result<(), QueueError> {
        self.push(&id.to_string()).await
    }

    async fn enqueue_unique(&self, id: ArticleId) -> Result<bool, QueueError> {
        self.push_unique(&id.to_string()).await
    }
}

/// Parse a queue payload back into an article id.
pub fn parse_article_id(payload: &str) -> Option<ArticleId> {
    payload.trim().parse::<ArticleId>().ok().filter(|id| *id > 0)
}
