//! Reconciliation sweep: re-enqueue articles stuck in `pending` or
//! `processing`, e.g. after a failed push or a consumer crash mid-attempt.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::counter;

use crate::error::SweepError;
use crate::queue::WorkQueue;
use crate::store::ArticleStore;

/// Rows looked at per sweep.
pub const SWEEP_BATCH: i64 = 1000;

/// Re-enqueue every non-terminal article whose status has not changed for
/// `stale_after` and is not already waiting in the queue. Every stale row is
/// touched so the next sweep skips it. Returns how many were re-enqueued.
pub async fn requeue_stale(
    store: &ArticleStore,
    queue: &dyn WorkQueue,
    now: DateTime<Utc>,
    stale_after: ChronoDuration,
) -> Result<usize, SweepError> {
    let cutoff = now - stale_after;
    let ids = store.stale_article_ids(cutoff, SWEEP_BATCH).await?;
    let mut requeued = 0;
    let mut still_queued = 0;
    for id in ids {
        if queue.enqueue_unique(id).await? {
            requeued += 1;
        } else {
            still_queued += 1;
        }
        store.touch(id, now).await?;
    }
    if still_queued > 0 {
        tracing::debug!(still_queued, "stale articles already waiting in the queue");
    }
    if requeued > 0 {
        tracing::info!(requeued, cutoff = %cutoff, "sweep re-enqueued stale articles");
        counter!("sweep_requeued_total").increment(requeued as u64);
    }
    Ok(requeued)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::ArticleStatus;
    use crate::queue::{MemoryQueue, SqliteQueue};
    use crate::store::tests::{candidate, memory_store};
    use crate::store::InsertOutcome;

    #[tokio::test]
    async fn stale_rows_are_requeued_once() {
        let store = memory_store().await;
        let q = MemoryQueue::new();
        let InsertOutcome::Inserted(a) = store.insert_if_absent(&candidate("https://x/a")).await.unwrap() else {
            panic!("expected insert");
        };
        let InsertOutcome::Inserted(b) = store.insert_if_absent(&candidate("https://x/b")).await.unwrap() else {
            panic!("expected insert");
        };
        store.update_status(b, ArticleStatus::Failed).await.unwrap();

        let later = Utc::now() + ChronoDuration::minutes(30);
        let n = requeue_stale(&store, &q, later, ChronoDuration::minutes(15)).await.unwrap();
        assert_eq!(n, 1);
        assert_eq!(q.snapshot().await, vec![a.to_string()]);

        // Touched: a second sweep at the same instant finds nothing.
        let n = requeue_stale(&store, &q, later, ChronoDuration::minutes(15)).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn queued_ids_are_not_duplicated_across_sweeps() {
        let store = memory_store().await;
        let q = SqliteQueue::new(store.pool().clone(), "sweep");
        let InsertOutcome::Inserted(id) = store.insert_if_absent(&candidate("https://x/a")).await.unwrap() else {
            panic!("expected insert");
        };
        q.enqueue(id).await.unwrap();

        let stale = ChronoDuration::minutes(15);
        let mut now = Utc::now();
        for _ in 0..3 {
            now += ChronoDuration::minutes(20);
            let n = requeue_stale(&store, &q, now, stale).await.unwrap();
            assert_eq!(n, 0);
        }
        assert_eq!(q.len().await.unwrap(), 1);

        // Once the entry is gone, the next stale sweep brings it back.
        q.pop(std::time::Duration::from_millis(10)).await.unwrap();
        now += ChronoDuration::minutes(20);
        assert_eq!(requeue_stale(&store, &q, now, stale).await.unwrap(), 1);
        assert_eq!(q.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn processing_rows_left_by_a_crash_are_requeued() {
        let store = memory_store().await;
        let q = MemoryQueue::new();
        let InsertOutcome::Inserted(id) = store.insert_if_absent(&candidate("https://x/a")).await.unwrap() else {
            panic!("expected insert");
        };
        assert!(store.update_status(id, ArticleStatus::Processing).await.unwrap());

        let stale = ChronoDuration::minutes(15);
        let n = requeue_stale(&store, &q, Utc::now() + stale - ChronoDuration::seconds(30), stale)
            .await
            .unwrap();
        assert_eq!(n, 0);

        let n = requeue_stale(&store, &q, Utc::now() + stale + ChronoDuration::seconds(1), stale)
            .await
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(q.snapshot().await, vec![id.to_string()]);
    }

    #[tokio::test]
    async fn fresh_rows_are_left_alone() {
        let store = memory_store().await;
        let q = MemoryQueue::new();
        store.insert_if_absent(&candidate("https://x/a")).await.unwrap();
        let n = requeue_stale(&store, &q, Utc::now(), ChronoDuration::minutes(15)).await.unwrap();
        assert_eq!(n, 0);
        assert!(q.is_empty().await.unwrap());
    }
}
