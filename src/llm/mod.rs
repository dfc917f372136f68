//! Language-model contracts used by the pipeline, plus vendor backends.
//!
//! Two layers, like the rest of our provider code: a low-level
//! [`ChatBackend`] that does one remote completion, and [`LlmClient`] which
//! owns the prompts and turns raw text into typed results. The consumer and
//! digest engine only see the [`Normalizer`] and [`StoryModel`] traits.

pub mod anthropic;
pub mod client;
pub mod mock;
pub mod openai;
pub mod prompts;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::article::ArticleId;
use crate::error::ModelError;
use crate::summary::StoryDraft;

pub use anthropic::AnthropicBackend;
pub use client::LlmClient;
pub use mock::MockBackend;
pub use openai::OpenAiBackend;

/// Most clusters a cluster pass may return.
pub const MAX_CLUSTERS: usize = 10;

/// Neutral rewrite of one article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Normalization {
    pub headline: String,
    pub detail: String,
    pub category: String,
    /// How emotional the original was, 1 (calm) ..= 10.
    pub sentiment_score: i32,
    pub prompt_version: String,
    pub model_used: String,
}

/// One article as shown to the digest prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestInput {
    pub id: ArticleId,
    pub headline: String,
    pub detail: String,
    pub publisher: String,
    pub published_at: Option<DateTime<Utc>>,
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlainDigest {
    pub paragraph: String,
    pub bullets: Vec<String>,
    pub model_used: String,
}

/// A cluster from the ranking pass. Indices point into the batch that was
/// sent and are not trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub article_indices: Vec<i64>,
    #[serde(default)]
    pub importance_reason: String,
}

#[async_trait]
pub trait Normalizer: Send + Sync {
    async fn normalize(&self, headline: &str, detail: &str) -> Result<Normalization, ModelError>;
}

#[async_trait]
pub trait StoryModel: Send + Sync {
    /// Single-pass executive paragraph + bullets.
    async fn summarize(&self, articles: &[DigestInput]) -> Result<PlainDigest, ModelError>;

    /// Pass 1: group the batch by primary subject and rank the groups.
    async fn cluster_and_rank(&self, articles: &[DigestInput]) -> Result<Vec<Cluster>, ModelError>;

    /// Pass 2: one story from the members of one cluster.
    async fn synthesize(&self, articles: &[DigestInput]) -> Result<StoryDraft, ModelError>;

    /// Identifier recorded on summaries produced by the two-pass path.
    fn digest_model(&self) -> String;
}

/// One chat completion request.
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub system: &'a str,
    pub user: &'a str,
    pub max_tokens: u32,
}

/// Low-level provider: does the real remote call and returns the text.
#[async_trait]
pub trait ChatBackend: Send + Sync + 'static {
    async fn complete(&self, req: ChatRequest<'_>) -> Result<String, ModelError>;
    fn name(&self) -> &'static str;
}

/// Strip code fences and surrounding prose so only the outermost JSON object remains.
pub fn clean_json_response(content: &str) -> &str {
    let mut s = content.trim();
    s = s.strip_prefix("```json").unwrap_or(s);
    s = s.strip_prefix("```").unwrap_or(s);
    s = s.strip_suffix("```").unwrap_or(s);
    s = s.trim();

    if let (Some(start), Some(end)) = (s.find('{'), s.rfind('}')) {
        if end > start {
            return &s[start..=end];
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_json_is_unchanged() {
        assert_eq!(clean_json_response(r#"{"headline":"test"}"#), r#"{"headline":"test"}"#);
    }

    #[test]
    fn fences_are_stripped() {
        assert_eq!(
            clean_json_response("```json\n{\"headline\":\"test\"}\n```"),
            r#"{"headline":"test"}"#
        );
        assert_eq!(
            clean_json_response("```\n{\"headline\":\"test\"}\n```"),
            r#"{"headline":"test"}"#
        );
    }

    #[test]
    fn surrounding_prose_is_dropped() {
        assert_eq!(
            clean_json_response("Sure! Here you go:\n{\"a\":{\"b\":1}}\nHope it helps."),
            r#"{"a":{"b":1}}"#
        );
    }

    #[test]
    fn text_without_object_is_returned_trimmed() {
        assert_eq!(clean_json_response("  nothing here  "), "nothing here");
    }
}
