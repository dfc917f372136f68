//! Periodic drivers for ingest and the reconciliation sweep. Both stop at the
//! next tick once the shutdown channel flips to `true`.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::queue::WorkQueue;
use crate::sources::SourceAdapter;
use crate::store::ArticleStore;

#[derive(Clone, Copy, Debug)]
pub struct IngestSchedulerCfg {
    pub interval: Duration,
    pub fetch_limit: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct SweepSchedulerCfg {
    pub interval: Duration,
    pub stale_after: Duration,
}

/// Run ingest on every tick (the first tick fires immediately).
pub fn spawn_ingest_scheduler(
    cfg: IngestSchedulerCfg,
    sources: Vec<Arc<dyn SourceAdapter>>,
    store: ArticleStore,
    queue: Arc<dyn WorkQueue>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cfg.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            if *shutdown.borrow() {
                break;
            }

            let report =
                crate::ingest::run_once(&sources, &store, queue.as_ref(), cfg.fetch_limit).await;
            counter!("ingest_runs_total").increment(1);
            tracing::info!(
                target: "ingest",
                saved = report.saved(),
                duplicate = report.duplicate(),
                errors = report.errors(),
                "ingest tick"
            );
        }
        tracing::info!(target: "ingest", "ingest scheduler stopped");
    })
}

/// Run the reconciliation sweep on every tick (the first tick fires immediately).
pub fn spawn_sweep_scheduler(
    cfg: SweepSchedulerCfg,
    store: ArticleStore,
    queue: Arc<dyn WorkQueue>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let stale_after = chrono::Duration::from_std(cfg.stale_after)
            .unwrap_or_else(|_| chrono::Duration::minutes(15));
        let mut ticker = tokio::time::interval(cfg.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = crate::ingest::sweep::requeue_stale(
                &store,
                queue.as_ref(),
                chrono::Utc::now(),
                stale_after,
            )
            .await
            {
                tracing::warn!(error = %e, "reconciliation sweep failed");
            }
        }
    })
}
