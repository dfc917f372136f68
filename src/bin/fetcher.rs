//! Fetcher: pull news from the configured sources, store what is new and
//! enqueue it for normalization. One cycle by default; with
//! `ingest.interval_secs > 0` it keeps running until Ctrl-C.

use std::time::Duration;

use anyhow::Result;
use tracing::info;
use zennews::bootstrap;
use zennews::ingest::{self, scheduler};
use zennews::logging::init_tracing;
use zennews::PipelineConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cfg = PipelineConfig::load()?;
    init_tracing(cfg.log_format, "info");

    let store = bootstrap::connect_store(&cfg).await?;
    let queue = bootstrap::build_queue(&cfg, &store);
    let sources = bootstrap::build_sources(&cfg)?;

    if cfg.ingest.interval_secs == 0 {
        let report = ingest::run_once(&sources, &store, queue.as_ref(), cfg.ingest.fetch_limit).await;
        info!(
            saved = report.saved(),
            duplicate = report.duplicate(),
            errors = report.errors(),
            "fetch complete"
        );
        return Ok(());
    }

    let (_tx, shutdown) = bootstrap::shutdown_on_signal();
    let handle = scheduler::spawn_ingest_scheduler(
        scheduler::IngestSchedulerCfg {
            interval: Duration::from_secs(cfg.ingest.interval_secs),
            fetch_limit: cfg.ingest.fetch_limit,
        },
        sources,
        store,
        queue,
        shutdown,
    );
    handle.await?;
    Ok(())
}
