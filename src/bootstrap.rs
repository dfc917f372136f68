//! Process wiring. Every handle is built once here and passed down by value;
//! nothing is global.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::{resolve_api_key, PipelineConfig, QueueBackend, VendorSection};
use crate::llm::{
    AnthropicBackend, ChatBackend, LlmClient, MockBackend, Normalizer, OpenAiBackend, StoryModel,
};
use crate::queue::{MemoryQueue, SqliteQueue, WorkQueue};
use crate::sources::{
    http_client, AlphaVantageSource, FinnHubSource, MassiveSource, RssSource, SourceAdapter,
};
use crate::store::ArticleStore;

/// Both model roles, backed by one client.
#[derive(Clone)]
pub struct Models {
    pub provider: &'static str,
    pub normalizer: Arc<dyn Normalizer>,
    pub story: Arc<dyn StoryModel>,
}

fn wrap<B: ChatBackend>(client: LlmClient<B>) -> Models {
    let provider = client.provider_name();
    let client = Arc::new(client);
    Models {
        provider,
        normalizer: client.clone(),
        story: client,
    }
}

pub async fn connect_store(cfg: &PipelineConfig) -> Result<ArticleStore> {
    let store = ArticleStore::connect(&cfg.database_url)
        .await
        .with_context(|| format!("connecting to {}", cfg.database_url))?;
    info!(database_url = %cfg.database_url, "article store ready");
    Ok(store)
}

pub fn build_queue(cfg: &PipelineConfig, store: &ArticleStore) -> Arc<dyn WorkQueue> {
    match cfg.queue.backend {
        QueueBackend::Sqlite => Arc::new(
            SqliteQueue::new(store.pool().clone(), cfg.queue.name.clone())
                .with_poll_interval(Duration::from_millis(cfg.queue.poll_interval_ms)),
        ),
        QueueBackend::Memory => {
            warn!("memory queue selected; entries do not survive this process");
            Arc::new(MemoryQueue::new())
        }
    }
}

fn vendor_key(section: &VendorSection, env_var: &str) -> Result<String> {
    resolve_api_key(&section.api_key, env_var)
}

pub fn build_sources(cfg: &PipelineConfig) -> Result<Vec<Arc<dyn SourceAdapter>>> {
    let client = http_client(Duration::from_secs(cfg.sources.timeout_secs))?;
    let mut out: Vec<Arc<dyn SourceAdapter>> = Vec::new();

    for name in &cfg.ingest.sources {
        match name.as_str() {
            "finnhub" => {
                let s = &cfg.sources.finnhub;
                let mut src = FinnHubSource::new(client.clone(), vendor_key(s, "FINNHUB_API_KEY")?);
                if let Some(url) = &s.base_url {
                    src = src.with_base_url(url);
                }
                out.push(Arc::new(src));
            }
            "alphavantage" => {
                let s = &cfg.sources.alphavantage;
                let mut src =
                    AlphaVantageSource::new(client.clone(), vendor_key(s, "ALPHAVANTAGE_API_KEY")?);
                if let Some(url) = &s.base_url {
                    src = src.with_base_url(url);
                }
                out.push(Arc::new(src));
            }
            "massive" => {
                let s = &cfg.sources.massive;
                let mut src = MassiveSource::new(client.clone(), vendor_key(s, "MASSIVE_API_KEY")?);
                if let Some(url) = &s.base_url {
                    src = src.with_base_url(url);
                }
                out.push(Arc::new(src));
            }
            "rss" => {
                for feed in &cfg.rss.feeds {
                    out.push(Arc::new(RssSource::new(
                        client.clone(),
                        feed.name.clone(),
                        feed.url.clone(),
                    )));
                }
            }
            other => anyhow::bail!("Unsupported source in config: {other}"),
        }
    }

    info!(
        sources = ?out.iter().map(|s| s.name().to_string()).collect::<Vec<_>>(),
        "source adapters ready"
    );
    Ok(out)
}

pub fn build_models(cfg: &PipelineConfig) -> Result<Models> {
    let llm = &cfg.llm;
    let models = llm.models();
    let built = match llm.provider.as_str() {
        "openai" => {
            let key = resolve_api_key(&llm.api_key, "OPENAI_API_KEY")?;
            let mut backend = OpenAiBackend::new(key, llm.timeout())?;
            if let Some(url) = &llm.base_url {
                backend = backend.with_base_url(url);
            }
            wrap(LlmClient::new(backend, models))
        }
        "anthropic" => {
            let key = resolve_api_key(&llm.api_key, "ANTHROPIC_API_KEY")?;
            let mut backend = AnthropicBackend::new(key, llm.timeout())?;
            if let Some(url) = &llm.base_url {
                backend = backend.with_base_url(url);
            }
            wrap(LlmClient::new(backend, models))
        }
        "mock" => wrap(LlmClient::new(MockBackend, models)),
        other => anyhow::bail!("Unsupported llm provider in config: {other}"),
    };
    info!(provider = built.provider, "model client ready");
    Ok(built)
}

/// Shutdown channel flipped to `true` on Ctrl-C (and SIGTERM on unix).
pub fn shutdown_on_signal() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    let (tx, rx) = watch::channel(false);
    let signal_tx = tx.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        let _ = signal_tx.send(true);
    });
    (tx, rx)
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable; Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
