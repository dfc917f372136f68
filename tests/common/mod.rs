// tests/common/mod.rs
// Shared fakes for the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use zennews::error::{ModelError, QueueError};
use zennews::llm::{Cluster, DigestInput, Normalization, Normalizer, PlainDigest, StoryModel};
use zennews::sources::SourceAdapter;
use zennews::summary::StoryDraft;
use zennews::transform::Sleeper;
use zennews::{ArticleCandidate, ArticleStore, WorkQueue};

pub async fn memory_store() -> ArticleStore {
    ArticleStore::connect("sqlite::memory:").await.unwrap()
}

/// Make the next raw article id `next`.
pub async fn start_ids_at(store: &ArticleStore, next: i64) {
    sqlx::query("INSERT INTO sqlite_sequence (name, seq) VALUES ('raw_articles', ?)")
        .bind(next - 1)
        .execute(store.pool())
        .await
        .unwrap();
}

pub fn candidate(url: &str, headline: &str) -> ArticleCandidate {
    ArticleCandidate {
        external_id: format!("ext:{url}"),
        headline: headline.to_string(),
        detail: format!("{headline} in detail."),
        url: url.to_string(),
        source: "Fake".to_string(),
        publisher: "Reuters".to_string(),
        published_at: Some(Utc.with_ymd_and_hms(2025, 3, 1, 14, 0, 0).unwrap()),
        symbols: vec!["AAPL".to_string()],
    }
}

/// Source that returns a fixed list, or fails.
pub struct FakeSource {
    pub name: String,
    pub items: Vec<ArticleCandidate>,
    pub fail: bool,
}

impl FakeSource {
    pub fn new(name: &str, items: Vec<ArticleCandidate>) -> Arc<dyn SourceAdapter> {
        Arc::new(Self {
            name: name.to_string(),
            items,
            fail: false,
        })
    }

    pub fn failing(name: &str) -> Arc<dyn SourceAdapter> {
        Arc::new(Self {
            name: name.to_string(),
            items: Vec::new(),
            fail: true,
        })
    }
}

#[async_trait]
impl SourceAdapter for FakeSource {
    async fn fetch(&self, limit: usize) -> anyhow::Result<Vec<ArticleCandidate>> {
        if self.fail {
            anyhow::bail!("{} is down", self.name);
        }
        Ok(self.items.iter().take(limit).cloned().collect())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Queue whose pushes always fail.
pub struct BrokenQueue;

#[async_trait]
impl WorkQueue for BrokenQueue {
    async fn push(&self, _payload: &str) -> Result<(), QueueError> {
        Err(QueueError::Backend(sqlx::Error::PoolClosed))
    }
    async fn pop(&self, _timeout: Duration) -> Result<Option<String>, QueueError> {
        Ok(None)
    }
    async fn len(&self) -> Result<u64, QueueError> {
        Ok(0)
    }
    async fn contains(&self, _payload: &str) -> Result<bool, QueueError> {
        Ok(false)
    }
}

#[derive(Default)]
pub struct NoSleep(pub Mutex<Vec<Duration>>);

#[async_trait]
impl Sleeper for NoSleep {
    async fn sleep(&self, d: Duration) {
        self.0.lock().push(d);
    }
}

/// Normalizer that replays scripted results and counts calls.
pub struct ScriptedNormalizer {
    script: Mutex<VecDeque<Result<String, ()>>>,
    fallback_category: Option<String>,
    pub calls: Mutex<usize>,
}

impl ScriptedNormalizer {
    /// Always answers with `category`.
    pub fn always(category: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback_category: Some(category.to_string()),
            calls: Mutex::new(0),
        }
    }

    /// Always fails.
    pub fn failing() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback_category: None,
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl Normalizer for ScriptedNormalizer {
    async fn normalize(&self, headline: &str, detail: &str) -> Result<Normalization, ModelError> {
        *self.calls.lock() += 1;
        let next = self.script.lock().pop_front();
        let category = match next {
            Some(Ok(c)) => c,
            Some(Err(())) => return Err(ModelError::Empty),
            None => match &self.fallback_category {
                Some(c) => c.clone(),
                None => {
                    return Err(ModelError::Status {
                        status: 503,
                        body: "overloaded".into(),
                    })
                }
            },
        };
        Ok(Normalization {
            headline: format!("Neutral: {headline}"),
            detail: detail.to_string(),
            category,
            sentiment_score: 3,
            prompt_version: "v1".into(),
            model_used: "scripted".into(),
        })
    }
}

/// Story model with a fixed cluster answer; records what each synthesis saw.
pub struct ScriptedStories {
    pub clusters: Vec<Cluster>,
    pub batches_seen: Mutex<Vec<Vec<i64>>>,
    pub synth_seen: Mutex<Vec<Vec<i64>>>,
}

impl ScriptedStories {
    pub fn new(clusters: Vec<(&str, Vec<i64>)>) -> Self {
        Self {
            clusters: clusters
                .into_iter()
                .map(|(topic, idx)| Cluster {
                    topic: topic.to_string(),
                    article_indices: idx,
                    importance_reason: "scripted".into(),
                })
                .collect(),
            batches_seen: Mutex::new(Vec::new()),
            synth_seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl StoryModel for ScriptedStories {
    async fn summarize(&self, articles: &[DigestInput]) -> Result<PlainDigest, ModelError> {
        Ok(PlainDigest {
            paragraph: format!("{} articles", articles.len()),
            bullets: vec!["one".into(), "two".into(), "three".into()],
            model_used: "scripted".into(),
        })
    }

    async fn cluster_and_rank(&self, articles: &[DigestInput]) -> Result<Vec<Cluster>, ModelError> {
        self.batches_seen
            .lock()
            .push(articles.iter().map(|a| a.id).collect());
        Ok(self.clusters.clone())
    }

    async fn synthesize(&self, articles: &[DigestInput]) -> Result<StoryDraft, ModelError> {
        self.synth_seen
            .lock()
            .push(articles.iter().map(|a| a.id).collect());
        Ok(StoryDraft {
            headline: articles
                .iter()
                .map(|a| a.headline.as_str())
                .collect::<Vec<_>>()
                .join(" + "),
            summary: "Synthesized.".into(),
            angles: vec!["earnings".into()],
            tickers: articles.iter().flat_map(|a| a.symbols.clone()).collect(),
            publishers: vec!["Reuters".into()],
            time_range: "Mar 1 14:00 - Mar 1 14:00".into(),
        })
    }

    fn digest_model(&self) -> String {
        "scripted-digest".into()
    }
}
