use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use super::WorkQueue;
use crate::error::QueueError;

/// In-process queue for single-process runs and tests. Not durable.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    items: Mutex<VecDeque<String>>,
    notify: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the backlog, head first.
    pub async fn snapshot(&self) -> Vec<String> {
        self.items.lock().await.iter().cloned().collect()
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn push(&self, payload: &str) -> Result<(), QueueError> {
        self.items.lock().await.push_back(payload.to_string());
        self.notify.notify_one();
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<String>, QueueError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register interest before checking so a push in between is not missed.
            let notified = self.notify.notified();
            if let Some(item) = self.items.lock().await.pop_front() {
                return Ok(Some(item));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(self.items.lock().await.pop_front());
            }
        }
    }

    async fn len(&self) -> Result<u64, QueueError> {
        Ok(self.items.lock().await.len() as u64)
    }

    async fn contains(&self, payload: &str) -> Result<bool, QueueError> {
        Ok(self.items.lock().await.iter().any(|p| p == payload))
    }

    async fn push_unique(&self, payload: &str) -> Result<bool, QueueError> {
        let mut items = self.items.lock().await;
        if items.iter().any(|p| p == payload) {
            return Ok(false);
        }
        items.push_back(payload.to_string());
        drop(items);
        self.notify.notify_one();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn fifo_order_and_length() {
        let q = MemoryQueue::new();
        q.enqueue(1).await.unwrap();
        q.enqueue(2).await.unwrap();
        q.push("3").await.unwrap();
        assert_eq!(q.len().await.unwrap(), 3);

        let d = Duration::from_millis(10);
        assert_eq!(q.pop(d).await.unwrap().as_deref(), Some("1"));
        assert_eq!(q.pop(d).await.unwrap().as_deref(), Some("2"));
        assert_eq!(q.pop(d).await.unwrap().as_deref(), Some("3"));
        assert!(q.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn push_unique_skips_waiting_duplicates() {
        let q = MemoryQueue::new();
        assert!(q.enqueue_unique(7).await.unwrap());
        assert!(!q.enqueue_unique(7).await.unwrap());
        assert!(q.contains("7").await.unwrap());
        assert_eq!(q.snapshot().await, vec!["7"]);

        q.pop(Duration::from_millis(10)).await.unwrap();
        assert!(!q.contains("7").await.unwrap());
        assert!(q.enqueue_unique(7).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn pop_times_out_on_empty_queue() {
        let q = MemoryQueue::new();
        let got = q.pop(Duration::from_secs(5)).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn pop_wakes_on_push() {
        let q = Arc::new(MemoryQueue::new());
        let q2 = q.clone();
        let waiter = tokio::spawn(async move { q2.pop(Duration::from_secs(5)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.enqueue(42).await.unwrap();
        let got = waiter.await.unwrap().unwrap();
        assert_eq!(got.as_deref(), Some("42"));
    }
}
