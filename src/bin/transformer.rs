//! Transformer: long-running normalization consumer. Also runs the
//! reconciliation sweep and, when `metrics_addr` is set, serves `/metrics`.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use zennews::bootstrap;
use zennews::ingest::scheduler::{spawn_sweep_scheduler, SweepSchedulerCfg};
use zennews::logging::init_tracing;
use zennews::metrics::Metrics;
use zennews::{PipelineConfig, TransformWorker};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cfg = PipelineConfig::load()?;
    init_tracing(cfg.log_format, "info");

    let store = bootstrap::connect_store(&cfg).await?;
    let queue = bootstrap::build_queue(&cfg, &store);
    let models = bootstrap::build_models(&cfg)?;
    let (_tx, shutdown) = bootstrap::shutdown_on_signal();

    let metrics_task = match &cfg.metrics_addr {
        Some(addr) => {
            let addr: SocketAddr = addr
                .parse()
                .with_context(|| format!("invalid metrics_addr {addr:?}"))?;
            let metrics = Metrics::init()?;
            Some(metrics.serve(addr, shutdown.clone()).await?)
        }
        None => None,
    };

    let sweep = spawn_sweep_scheduler(
        SweepSchedulerCfg {
            interval: Duration::from_secs(cfg.sweep.interval_secs),
            stale_after: Duration::from_secs(cfg.sweep.stale_after_secs),
        },
        store.clone(),
        queue.clone(),
        shutdown.clone(),
    );

    let worker = TransformWorker::new(store, queue, models.normalizer, cfg.transform_config());
    let stats = worker.run(shutdown).await;
    info!(completed = stats.completed, retried = stats.retried, "transformer exiting");

    sweep.abort();
    if let Some(task) = metrics_task {
        task.abort();
    }
    Ok(())
}
