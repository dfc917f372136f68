//! Transform consumer: pops article ids and drives each article through
//! `pending -> processing -> completed | failed`.
//!
//! Retries are bounded by the processing-error ledger in the store, not by
//! the queue. A failed model call appends one error row, pushes the id back
//! to the tail and sleeps the backoff. Once the ledger holds `max_attempts`
//! rows the next delivery marks the article `failed` and drops the id.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::article::{ArticleId, ArticleStatus, NewNormalizedArticle, OTHERS_CATEGORY};
use crate::error::{QueueError, StoreError};
use crate::llm::Normalizer;
use crate::queue::{parse_article_id, WorkQueue};
use crate::store::{ArticleStore, Completion};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("transform_completed_total", "Articles normalized and completed.");
        describe_counter!("transform_retries_total", "Model failures that were re-enqueued.");
        describe_counter!(
            "transform_dead_lettered_total",
            "Articles marked failed after reaching the attempt ceiling."
        );
        describe_counter!(
            "transform_dropped_total",
            "Queue entries dropped: malformed, missing row or already terminal."
        );
        describe_counter!(
            "transform_category_fallback_total",
            "Model categories that were unknown and replaced by Others."
        );
        describe_histogram!("transform_model_ms", "Normalization model latency in milliseconds.");
        describe_gauge!("queue_backlog", "Work queue length seen by the consumer.");
    });
}

/// Pause used for retry backoff. Injected so tests don't wait.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, d: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, d: Duration) {
        tokio::time::sleep(d).await;
    }
}

#[derive(Debug, Clone)]
pub struct TransformConfig {
    /// Failed attempts after which an article is marked `failed`.
    pub max_attempts: i64,
    pub retry_backoff: Duration,
    pub dequeue_timeout: Duration,
    /// Return from [`TransformWorker::run`] on the first empty wait.
    pub exit_when_idle: bool,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff: Duration::from_secs(5),
            dequeue_timeout: Duration::from_secs(5),
            exit_when_idle: false,
        }
    }
}

/// What happened to one queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The wait expired with nothing to do.
    Idle,
    Malformed(String),
    /// Attempt ceiling reached. `marked` is false when the row was already
    /// terminal or missing.
    DeadLettered { id: ArticleId, attempts: i64, marked: bool },
    Missing(ArticleId),
    AlreadyTerminal { id: ArticleId, status: ArticleStatus },
    /// Model call failed; the id went back to the tail.
    Retrying { id: ArticleId, attempt: i64, requeued: bool },
    Completed { id: ArticleId, category: String, fell_back: bool },
    /// Another consumer finished it first.
    Skipped(ArticleId),
    /// Store failure; the sweep is the recovery path.
    StoreFailed(ArticleId),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub completed: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub dropped: u64,
    pub store_failures: u64,
}

impl RunStats {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Idle => {}
            Outcome::Completed { .. } => self.completed += 1,
            Outcome::Retrying { .. } => self.retried += 1,
            Outcome::DeadLettered { .. } => self.dead_lettered += 1,
            Outcome::Malformed(_)
            | Outcome::Missing(_)
            | Outcome::AlreadyTerminal { .. }
            | Outcome::Skipped(_) => self.dropped += 1,
            Outcome::StoreFailed(_) => self.store_failures += 1,
        }
    }
}

pub struct TransformWorker {
    store: ArticleStore,
    queue: Arc<dyn WorkQueue>,
    model: Arc<dyn Normalizer>,
    sleeper: Arc<dyn Sleeper>,
    cfg: TransformConfig,
}

impl TransformWorker {
    pub fn new(
        store: ArticleStore,
        queue: Arc<dyn WorkQueue>,
        model: Arc<dyn Normalizer>,
        cfg: TransformConfig,
    ) -> Self {
        Self {
            store,
            queue,
            model,
            sleeper: Arc::new(TokioSleeper),
            cfg,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Consume until shutdown (or the first idle wait with `exit_when_idle`).
    /// Shutdown is checked between pops, never during one, so an entry that
    /// left the queue is always handled. Exit latency is at most one
    /// `dequeue_timeout`.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> RunStats {
        ensure_metrics_described();
        info!(
            max_attempts = self.cfg.max_attempts,
            backoff_ms = self.cfg.retry_backoff.as_millis() as u64,
            "transform consumer started"
        );
        let mut stats = RunStats::default();

        loop {
            // A dropped sender counts as shutdown.
            if *shutdown.borrow() || shutdown.has_changed().is_err() {
                break;
            }
            match self.queue.pop(self.cfg.dequeue_timeout).await {
                Ok(Some(payload)) => {
                    let outcome = self.handle(&payload).await;
                    stats.record(&outcome);
                }
                Ok(None) => {
                    if let Ok(n) = self.queue.len().await {
                        gauge!("queue_backlog").set(n as f64);
                    }
                    if self.cfg.exit_when_idle {
                        debug!("queue idle; exiting");
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, "queue pop failed");
                    self.sleeper.sleep(self.cfg.retry_backoff).await;
                }
            }
        }

        info!(
            completed = stats.completed,
            retried = stats.retried,
            dead_lettered = stats.dead_lettered,
            dropped = stats.dropped,
            "transform consumer stopped"
        );
        stats
    }

    /// Pop one entry (bounded wait) and process it.
    pub async fn process_next(&self) -> Result<Outcome, QueueError> {
        ensure_metrics_described();
        match self.queue.pop(self.cfg.dequeue_timeout).await? {
            Some(payload) => Ok(self.handle(&payload).await),
            None => Ok(Outcome::Idle),
        }
    }

    /// Process one queue payload. Never panics and never propagates: every
    /// failure is absorbed into an [`Outcome`].
    pub async fn handle(&self, payload: &str) -> Outcome {
        let Some(id) = parse_article_id(payload) else {
            warn!(payload, "dropping malformed queue entry");
            counter!("transform_dropped_total").increment(1);
            return Outcome::Malformed(payload.to_string());
        };

        match self.attempt(id, payload).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    error = %e,
                    class = e.class().as_str(),
                    article_id = id,
                    "store failure during transform"
                );
                Outcome::StoreFailed(id)
            }
        }
    }

    async fn attempt(&self, id: ArticleId, payload: &str) -> Result<Outcome, StoreError> {
        let attempts = self.store.attempt_count(id).await?;
        if attempts >= self.cfg.max_attempts {
            let marked = self.store.update_status(id, ArticleStatus::Failed).await?;
            warn!(article_id = id, attempts, marked, "attempt ceiling reached; marking failed");
            counter!("transform_dead_lettered_total").increment(1);
            return Ok(Outcome::DeadLettered {
                id,
                attempts,
                marked,
            });
        }

        let Some(article) = self.store.get_raw(id).await? else {
            warn!(article_id = id, "article not found; dropping");
            counter!("transform_dropped_total").increment(1);
            return Ok(Outcome::Missing(id));
        };
        if article.status.is_terminal() {
            debug!(article_id = id, status = %article.status, "already terminal; skipping");
            counter!("transform_dropped_total").increment(1);
            return Ok(Outcome::AlreadyTerminal {
                id,
                status: article.status,
            });
        }

        if !self.store.update_status(id, ArticleStatus::Processing).await? {
            // Lost a race with another consumer between the read and the update.
            counter!("transform_dropped_total").increment(1);
            return Ok(match self.store.get_raw(id).await? {
                Some(a) => Outcome::AlreadyTerminal { id, status: a.status },
                None => Outcome::Missing(id),
            });
        }

        let attempt = attempts + 1;
        debug!(article_id = id, attempt, "normalizing");
        let started = Instant::now();
        let result = self.model.normalize(&article.headline, &article.detail).await;
        histogram!("transform_model_ms").record(started.elapsed().as_secs_f64() * 1_000.0);

        let normalized = match result {
            Ok(n) => n,
            Err(e) => {
                warn!(
                    article_id = id,
                    attempt,
                    max_attempts = self.cfg.max_attempts,
                    error = %e,
                    class = e.class().as_str(),
                    "normalization failed; will retry"
                );
                self.store
                    .append_error(id, &e.to_string(), e.kind())
                    .await?;
                let requeued = match self.queue.push(payload.trim()).await {
                    Ok(()) => true,
                    Err(qe) => {
                        error!(article_id = id, error = %qe, "re-enqueue failed; left for sweep");
                        false
                    }
                };
                counter!("transform_retries_total").increment(1);
                self.sleeper.sleep(self.cfg.retry_backoff).await;
                return Ok(Outcome::Retrying {
                    id,
                    attempt,
                    requeued,
                });
            }
        };

        let (category, fell_back) = match self.store.category_by_name(&normalized.category).await? {
            Some(c) => (c, false),
            None => {
                warn!(
                    article_id = id,
                    category = %normalized.category,
                    "unknown category; falling back to {OTHERS_CATEGORY}"
                );
                counter!("transform_category_fallback_total").increment(1);
                let others = self
                    .store
                    .category_by_name(OTHERS_CATEGORY)
                    .await?
                    .ok_or_else(|| StoreError::NotFound(format!("category {OTHERS_CATEGORY}")))?;
                (others, true)
            }
        };

        let row = NewNormalizedArticle {
            raw_id: id,
            headline: normalized.headline,
            detail: normalized.detail,
            category_id: category.id,
            sentiment_score: normalized.sentiment_score,
            prompt_version: normalized.prompt_version,
            model_used: normalized.model_used,
            transformed_at: Utc::now(),
        };

        match self.store.complete(&row).await? {
            Completion::Committed(normalized_id) => {
                info!(
                    article_id = id,
                    normalized_id,
                    category = %category.name,
                    attempt,
                    "article normalized"
                );
                counter!("transform_completed_total").increment(1);
                Ok(Outcome::Completed {
                    id,
                    category: category.name,
                    fell_back,
                })
            }
            Completion::Skipped => {
                counter!("transform_dropped_total").increment(1);
                Ok(Outcome::Skipped(id))
            }
        }
    }
}
