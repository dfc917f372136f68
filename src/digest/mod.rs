//! Digest engine: turns the backlog of un-summarized raw articles into one
//! `NewsSummary`, either as ranked stories (cluster, then synthesize each
//! cluster) or as a single paragraph with bullets.
//!
//! Batches are taken strictly after the newest summary's upper bound, so
//! summary ranges never overlap and sequential runs leave no gaps.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::article::{ArticleId, RawArticle};
use crate::error::DigestError;
use crate::llm::{Cluster, DigestInput, StoryModel};
use crate::store::ArticleStore;
use crate::summary::{NewSummary, StoryDraft};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("digest_runs_total", "Digest runs that persisted a summary.");
        describe_counter!("digest_stories_total", "Stories persisted across all digests.");
        describe_histogram!("digest_model_ms", "Model time per digest run in milliseconds.");
    });
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestMode {
    /// Two passes: cluster + rank, then one synthesis per cluster.
    #[default]
    Stories,
    /// Single pass: paragraph + bullets, no stories.
    Plain,
}

impl FromStr for DigestMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stories" => Ok(DigestMode::Stories),
            "plain" => Ok(DigestMode::Plain),
            other => Err(format!("unknown digest mode {other:?}")),
        }
    }
}

impl fmt::Display for DigestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DigestMode::Stories => "stories",
            DigestMode::Plain => "plain",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestReport {
    pub summary_id: i64,
    pub mode: DigestMode,
    pub article_count: i64,
    pub from_article_id: ArticleId,
    pub to_article_id: ArticleId,
    pub stories: usize,
}

/// Members of one cluster, in the order the model listed them. Negative,
/// out-of-range and repeated indices are dropped.
pub fn gather_cluster(articles: &[DigestInput], indices: &[i64]) -> Vec<DigestInput> {
    let mut seen = HashSet::new();
    indices
        .iter()
        .filter_map(|&i| usize::try_from(i).ok())
        .filter(|&i| i < articles.len() && seen.insert(i))
        .map(|i| articles[i].clone())
        .collect()
}

/// Pass 1 then pass 2. Stories come back in the model's cluster order.
/// Clusters with no valid members are skipped; any synthesis failure fails
/// the whole call.
pub async fn cluster_and_synthesize(
    model: &dyn StoryModel,
    articles: &[DigestInput],
) -> Result<Vec<StoryDraft>, DigestError> {
    let clusters: Vec<Cluster> = model
        .cluster_and_rank(articles)
        .await
        .map_err(DigestError::Cluster)?;
    info!(clusters = clusters.len(), articles = articles.len(), "clustered batch");

    let mut stories = Vec::with_capacity(clusters.len());
    for cluster in clusters {
        let members = gather_cluster(articles, &cluster.article_indices);
        if members.is_empty() {
            warn!(
                topic = %cluster.topic,
                indices = ?cluster.article_indices,
                "cluster has no valid article indices; skipping"
            );
            continue;
        }
        let story = model
            .synthesize(&members)
            .await
            .map_err(|source| DigestError::Synthesis {
                topic: cluster.topic.clone(),
                source,
            })?;
        stories.push(story);
    }
    Ok(stories)
}

pub struct DigestEngine {
    store: ArticleStore,
    model: Arc<dyn StoryModel>,
    mode: DigestMode,
    max_batch: Option<i64>,
}

impl DigestEngine {
    pub fn new(store: ArticleStore, model: Arc<dyn StoryModel>, mode: DigestMode) -> Self {
        Self {
            store,
            model,
            mode,
            max_batch: None,
        }
    }

    /// Cap the batch; the rest is picked up by the next run.
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = (max_batch > 0).then_some(max_batch as i64);
        self
    }

    /// The next batch: every raw article after the newest summary, ascending.
    pub async fn next_batch(&self) -> Result<Vec<DigestInput>, DigestError> {
        let after = self.store.last_summarized_id().await?;
        let raw = self.store.articles_after(after, self.max_batch).await?;
        let ids: Vec<ArticleId> = raw.iter().map(|a| a.id).collect();
        let mut symbols = self.store.symbols_for(&ids).await?;
        Ok(raw
            .into_iter()
            .map(|a| {
                let syms = symbols.remove(&a.id).unwrap_or_default();
                to_input(a, syms)
            })
            .collect())
    }

    /// Summarize the backlog once. `None` when there is nothing new.
    pub async fn run_once(&self) -> Result<Option<DigestReport>, DigestError> {
        ensure_metrics_described();
        let batch = self.next_batch().await?;
        let (Some(first), Some(last)) = (batch.first(), batch.last()) else {
            info!("no new articles to summarize");
            return Ok(None);
        };
        let (from, to) = (first.id, last.id);
        info!(mode = %self.mode, articles = batch.len(), from, to, "digest run started");

        let started = std::time::Instant::now();
        let (summary, stories) = match self.mode {
            DigestMode::Stories => {
                let stories = cluster_and_synthesize(self.model.as_ref(), &batch).await?;
                let summary = NewSummary {
                    paragraph: String::new(),
                    bullets: Vec::new(),
                    article_count: batch.len() as i64,
                    from_article_id: from,
                    to_article_id: to,
                    model_used: self.model.digest_model(),
                };
                (summary, stories)
            }
            DigestMode::Plain => {
                let digest = self
                    .model
                    .summarize(&batch)
                    .await
                    .map_err(DigestError::Summary)?;
                let summary = NewSummary {
                    paragraph: digest.paragraph,
                    bullets: digest.bullets,
                    article_count: batch.len() as i64,
                    from_article_id: from,
                    to_article_id: to,
                    model_used: digest.model_used,
                };
                (summary, Vec::new())
            }
        };
        histogram!("digest_model_ms").record(started.elapsed().as_secs_f64() * 1_000.0);

        let summary_id = self.store.save_digest(&summary, &stories).await?;
        counter!("digest_runs_total").increment(1);
        counter!("digest_stories_total").increment(stories.len() as u64);
        info!(
            summary_id,
            stories = stories.len(),
            from,
            to,
            "digest saved"
        );

        Ok(Some(DigestReport {
            summary_id,
            mode: self.mode,
            article_count: summary.article_count,
            from_article_id: from,
            to_article_id: to,
            stories: stories.len(),
        }))
    }
}

fn to_input(a: RawArticle, symbols: Vec<String>) -> DigestInput {
    DigestInput {
        id: a.id,
        headline: a.headline,
        detail: a.detail,
        publisher: a.publisher,
        published_at: a.published_at,
        symbols,
    }
}
