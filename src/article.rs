//! Article records as they move through the pipeline.
//!
//! A `RawArticle` is created once by ingest (status `pending`) and only its
//! status changes afterwards. A `NormalizedArticle` is written exactly once,
//! in the same transaction that flips the raw row to `completed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque store identifier of a raw article.
pub type ArticleId = i64;

/// Sentinel category used whenever the model names something we don't know.
pub const OTHERS_CATEGORY: &str = "Others";

/// Categories the normalization prompt is allowed to answer with.
pub const KNOWN_CATEGORIES: &[&str] = &[
    "Earnings",
    "Market Movement",
    "Economy",
    "Crypto",
    "Mergers & Acquisitions",
    "Policy & Regulation",
    "Company News",
    "Analysis",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ArticleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ArticleStatus::Pending => "pending",
            ArticleStatus::Processing => "processing",
            ArticleStatus::Completed => "completed",
            ArticleStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ArticleStatus::Pending),
            "processing" => Some(ArticleStatus::Processing),
            "completed" => Some(ArticleStatus::Completed),
            "failed" => Some(ArticleStatus::Failed),
            _ => None,
        }
    }

    /// `completed` and `failed` are reached at most once and never left.
    pub fn is_terminal(self) -> bool {
        matches!(self, ArticleStatus::Completed | ArticleStatus::Failed)
    }
}

impl std::fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a source adapter hands to ingest. The URL is the dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleCandidate {
    pub external_id: String,
    pub headline: String,
    pub detail: String,
    pub url: String,
    /// Adapter name, e.g. "FinnHub".
    pub source: String,
    /// Outlet that wrote the piece, e.g. "Reuters".
    pub publisher: String,
    pub published_at: Option<DateTime<Utc>>,
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawArticle {
    pub id: ArticleId,
    pub headline: String,
    pub detail: String,
    pub url: String,
    pub source: String,
    pub publisher: String,
    pub published_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
    pub external_id: String,
    pub status: ArticleStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

/// Row about to be committed by the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNormalizedArticle {
    pub raw_id: ArticleId,
    pub headline: String,
    pub detail: String,
    pub category_id: i64,
    pub sentiment_score: i32,
    pub prompt_version: String,
    pub model_used: String,
    pub transformed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedArticle {
    pub id: i64,
    pub raw_id: ArticleId,
    pub headline: String,
    pub detail: String,
    pub category_id: i64,
    pub category_name: String,
    pub sentiment_score: i32,
    pub prompt_version: String,
    pub model_used: String,
    pub transformed_at: DateTime<Utc>,
}

/// One failed normalization attempt. Only ever counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingError {
    pub article_id: ArticleId,
    pub message: String,
    pub kind: String,
}
