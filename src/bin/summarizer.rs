//! Summarizer: one digest run over every raw article newer than the last
//! summary. Meant to be run on a schedule (cron, systemd timer).

use anyhow::Result;
use tracing::{error, info};
use zennews::bootstrap;
use zennews::logging::init_tracing;
use zennews::{DigestEngine, PipelineConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cfg = PipelineConfig::load()?;
    init_tracing(cfg.log_format, "info");

    let store = bootstrap::connect_store(&cfg).await?;
    let models = bootstrap::build_models(&cfg)?;

    let engine = DigestEngine::new(store, models.story, cfg.digest.mode)
        .with_max_batch(cfg.digest.max_batch);

    let outcome = engine.run_once().await.inspect_err(|e| {
        error!(error = %e, class = e.class().as_str(), "digest run failed");
    })?;
    match outcome {
        Some(report) => info!(
            summary_id = report.summary_id,
            articles = report.article_count,
            from = report.from_article_id,
            to = report.to_article_id,
            stories = report.stories,
            "digest complete"
        ),
        None => info!("nothing to summarize"),
    }
    Ok(())
}
