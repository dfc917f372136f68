//! Digest records: one `NewsSummary` per run, ranked `NewsStory` rows under it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::article::ArticleId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsSummary {
    pub id: i64,
    pub paragraph: String,
    pub bullets: Vec<String>,
    pub article_count: i64,
    /// Inclusive id range covered by this digest.
    pub from_article_id: ArticleId,
    pub to_article_id: ArticleId,
    pub model_used: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSummary {
    pub paragraph: String,
    pub bullets: Vec<String>,
    pub article_count: i64,
    pub from_article_id: ArticleId,
    pub to_article_id: ArticleId,
    pub model_used: String,
}

/// One synthesized story as returned by the model, before ranking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryDraft {
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub angles: Vec<String>,
    #[serde(default)]
    pub tickers: Vec<String>,
    #[serde(default)]
    pub publishers: Vec<String>,
    #[serde(default)]
    pub time_range: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsStory {
    pub id: i64,
    pub summary_id: i64,
    /// 1-based, dense within a summary.
    pub rank: i64,
    pub headline: String,
    pub summary: String,
    pub angles: Vec<String>,
    pub tickers: Vec<String>,
    pub publishers: Vec<String>,
    pub time_range: String,
}
