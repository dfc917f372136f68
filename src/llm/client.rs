use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::prompts::{
    CLUSTER_SYSTEM, NORMALIZE_PROMPT_VERSION, NORMALIZE_SYSTEM, SUMMARY_SYSTEM, SYNTHESIZE_SYSTEM,
};
use super::{
    clean_json_response, ChatBackend, ChatRequest, Cluster, DigestInput, Normalization,
    Normalizer, PlainDigest, StoryModel, MAX_CLUSTERS,
};
use crate::error::ModelError;
use crate::summary::StoryDraft;

/// Characters of detail shown per article in the cluster prompt.
pub const CLUSTER_DETAIL_CHARS: usize = 200;

/// Model identifiers per task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSet {
    pub normalize: String,
    pub summary: String,
    /// Cluster and synthesis passes.
    pub digest: String,
}

impl ModelSet {
    pub fn uniform(model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            normalize: model.clone(),
            summary: model.clone(),
            digest: model,
        }
    }
}

/// Prompt-owning client over any [`ChatBackend`].
pub struct LlmClient<B: ChatBackend> {
    backend: B,
    models: ModelSet,
}

impl<B: ChatBackend> LlmClient<B> {
    pub fn new(backend: B, models: ModelSet) -> Self {
        Self { backend, models }
    }

    pub fn provider_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn models(&self) -> &ModelSet {
        &self.models
    }

    async fn ask<T: DeserializeOwned>(
        &self,
        model: &str,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<T, ModelError> {
        let raw = self
            .backend
            .complete(ChatRequest {
                model,
                system,
                user,
                max_tokens,
            })
            .await?;
        parse_json(&raw)
    }
}

pub(crate) fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T, ModelError> {
    let cleaned = clean_json_response(raw);
    if cleaned.is_empty() {
        return Err(ModelError::Empty);
    }
    serde_json::from_str(cleaned).map_err(|source| ModelError::Parse {
        source,
        content: raw.to_string(),
    })
}

#[derive(Deserialize)]
struct NormalizeResp {
    headline: String,
    summary: String,
    category: String,
    sentiment_score: f64,
}

#[derive(Deserialize)]
struct SummaryResp {
    paragraph: String,
    #[serde(default)]
    bullets: Vec<String>,
}

#[derive(Deserialize)]
struct ClusterResp {
    #[serde(default)]
    clusters: Vec<Cluster>,
}

#[derive(Deserialize)]
struct SynthesisResp {
    #[serde(default)]
    stories: Vec<StoryDraft>,
}

pub fn clamp_sentiment(score: f64) -> i32 {
    if score.is_nan() {
        return 1;
    }
    score.round().clamp(1.0, 10.0) as i32
}

#[async_trait]
impl<B: ChatBackend> Normalizer for LlmClient<B> {
    async fn normalize(&self, headline: &str, detail: &str) -> Result<Normalization, ModelError> {
        let user = format!("Headline: {headline}\nSummary: {detail}");
        let resp: NormalizeResp = self
            .ask(&self.models.normalize, NORMALIZE_SYSTEM, &user, 1024)
            .await?;
        Ok(Normalization {
            headline: resp.headline.trim().to_string(),
            detail: resp.summary.trim().to_string(),
            category: resp.category.trim().to_string(),
            sentiment_score: clamp_sentiment(resp.sentiment_score),
            prompt_version: NORMALIZE_PROMPT_VERSION.to_string(),
            model_used: self.models.normalize.clone(),
        })
    }
}

#[async_trait]
impl<B: ChatBackend> StoryModel for LlmClient<B> {
    async fn summarize(&self, articles: &[DigestInput]) -> Result<PlainDigest, ModelError> {
        let user = format_for_summary(articles);
        let resp: SummaryResp = self
            .ask(&self.models.summary, SUMMARY_SYSTEM, &user, 1024)
            .await?;
        Ok(PlainDigest {
            paragraph: resp.paragraph.trim().to_string(),
            bullets: resp
                .bullets
                .into_iter()
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty())
                .collect(),
            model_used: self.models.summary.clone(),
        })
    }

    async fn cluster_and_rank(&self, articles: &[DigestInput]) -> Result<Vec<Cluster>, ModelError> {
        let user = format_for_clustering(articles);
        let mut resp: ClusterResp = self
            .ask(&self.models.digest, CLUSTER_SYSTEM, &user, 4096)
            .await?;
        resp.clusters.truncate(MAX_CLUSTERS);
        Ok(resp.clusters)
    }

    async fn synthesize(&self, articles: &[DigestInput]) -> Result<StoryDraft, ModelError> {
        let user = format_for_synthesis(articles);
        let resp: SynthesisResp = self
            .ask(&self.models.digest, SYNTHESIZE_SYSTEM, &user, 2048)
            .await?;
        resp.stories.into_iter().next().ok_or(ModelError::NoStories)
    }

    fn digest_model(&self) -> String {
        self.models.digest.clone()
    }
}

/// Cut to `max` characters, marking the cut with `...`.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

fn published_label(a: &DigestInput) -> String {
    a.published_at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn format_for_summary(articles: &[DigestInput]) -> String {
    let mut out = String::new();
    for a in articles {
        out.push_str(&format!("Headline: {}\nSummary: {}\n\n", a.headline, a.detail));
    }
    out
}

pub fn format_for_clustering(articles: &[DigestInput]) -> String {
    let mut out = String::new();
    for (i, a) in articles.iter().enumerate() {
        out.push_str(&format!("[{i}] Headline: {}\n", a.headline));
        out.push_str(&format!(
            "    Summary: {}\n",
            truncate_chars(&a.detail, CLUSTER_DETAIL_CHARS)
        ));
        out.push_str(&format!("    Publisher: {}\n", a.publisher));
        out.push_str(&format!("    Published: {}\n", published_label(a)));
        if !a.symbols.is_empty() {
            out.push_str(&format!("    Symbols: {}\n", a.symbols.join(", ")));
        }
        out.push('\n');
    }
    out
}

pub fn format_for_synthesis(articles: &[DigestInput]) -> String {
    let mut out = String::new();
    for (i, a) in articles.iter().enumerate() {
        out.push_str(&format!("Article {}:\n", i + 1));
        out.push_str(&format!("Headline: {}\n", a.headline));
        out.push_str(&format!("Summary: {}\n", a.detail));
        out.push_str(&format!("Publisher: {}\n", a.publisher));
        out.push_str(&format!("Published: {}\n", published_label(a)));
        if !a.symbols.is_empty() {
            out.push_str(&format!("Symbols: {}\n", a.symbols.join(", ")));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;

    /// Replays canned replies and records the prompts it saw.
    struct Canned {
        replies: Mutex<Vec<String>>,
        seen: Mutex<Vec<(String, String, String)>>,
    }

    impl Canned {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatBackend for Canned {
        async fn complete(&self, req: ChatRequest<'_>) -> Result<String, ModelError> {
            self.seen.lock().push((
                req.model.to_string(),
                req.system.to_string(),
                req.user.to_string(),
            ));
            self.replies.lock().pop().ok_or(ModelError::Empty)
        }
        fn name(&self) -> &'static str {
            "canned"
        }
    }

    fn models() -> ModelSet {
        ModelSet {
            normalize: "norm-model".into(),
            summary: "sum-model".into(),
            digest: "digest-model".into(),
        }
    }

    fn input(id: i64, detail: &str) -> DigestInput {
        DigestInput {
            id,
            headline: format!("Headline {id}"),
            detail: detail.to_string(),
            publisher: "Reuters".into(),
            published_at: Some(Utc.with_ymd_and_hms(2025, 3, 1, 14, 5, 0).unwrap()),
            symbols: vec!["AAPL".into(), "MSFT".into()],
        }
    }

    #[tokio::test]
    async fn normalize_parses_fenced_json_and_clamps_score() {
        let client = LlmClient::new(
            Canned::new(&[
                "```json\n{\"headline\":\" Stocks fell \",\"summary\":\"Indexes decreased.\",\"category\":\"Market Movement\",\"sentiment_score\":14}\n```",
            ]),
            models(),
        );
        let n = client.normalize("STOCKS CRASH", "Bloodbath").await.unwrap();
        assert_eq!(n.headline, "Stocks fell");
        assert_eq!(n.detail, "Indexes decreased.");
        assert_eq!(n.category, "Market Movement");
        assert_eq!(n.sentiment_score, 10);
        assert_eq!(n.prompt_version, "v1");
        assert_eq!(n.model_used, "norm-model");

        let seen = client.backend.seen.lock();
        assert_eq!(seen[0].0, "norm-model");
        assert_eq!(seen[0].1, NORMALIZE_SYSTEM);
        assert_eq!(seen[0].2, "Headline: STOCKS CRASH\nSummary: Bloodbath");
    }

    #[tokio::test]
    async fn normalize_missing_field_is_parse_error() {
        let client = LlmClient::new(Canned::new(&["{\"headline\":\"x\"}"]), models());
        let err = client.normalize("h", "d").await.unwrap_err();
        assert!(matches!(err, ModelError::Parse { .. }));
        assert_eq!(err.kind(), "llm_parse");
    }

    #[test]
    fn sentiment_is_clamped_into_range() {
        assert_eq!(clamp_sentiment(0.0), 1);
        assert_eq!(clamp_sentiment(-4.0), 1);
        assert_eq!(clamp_sentiment(6.4), 6);
        assert_eq!(clamp_sentiment(99.0), 10);
        assert_eq!(clamp_sentiment(f64::NAN), 1);
    }

    #[tokio::test]
    async fn cluster_response_is_capped() {
        let clusters: Vec<_> = (0..12)
            .map(|i| serde_json::json!({"topic": format!("t{i}"), "article_indices": [i]}))
            .collect();
        let reply = serde_json::json!({ "clusters": clusters }).to_string();
        let client = LlmClient::new(Canned::new(&[reply.as_str()]), models());
        let got = client.cluster_and_rank(&[input(1, "d")]).await.unwrap();
        assert_eq!(got.len(), MAX_CLUSTERS);
        assert_eq!(got[0].topic, "t0");
        assert_eq!(client.backend.seen.lock()[0].0, "digest-model");
    }

    #[tokio::test]
    async fn synthesis_without_stories_fails() {
        let client = LlmClient::new(Canned::new(&["{\"stories\":[]}"]), models());
        let err = client.synthesize(&[input(1, "d")]).await.unwrap_err();
        assert!(matches!(err, ModelError::NoStories));
    }

    #[tokio::test]
    async fn synthesis_takes_first_story() {
        let client = LlmClient::new(
            Canned::new(&[
                r#"{"stories":[{"headline":"Apple beats","summary":"s","tickers":["AAPL"],"publishers":["Reuters"]},{"headline":"ignored"}]}"#,
            ]),
            models(),
        );
        let story = client.synthesize(&[input(1, "d")]).await.unwrap();
        assert_eq!(story.headline, "Apple beats");
        assert_eq!(story.tickers, vec!["AAPL"]);
        assert!(story.angles.is_empty());
    }

    #[tokio::test]
    async fn summarize_drops_blank_bullets() {
        let client = LlmClient::new(
            Canned::new(&[r#"{"paragraph":"Calm day.","bullets":["a"," ","b"]}"#]),
            models(),
        );
        let d = client.summarize(&[input(1, "d")]).await.unwrap();
        assert_eq!(d.paragraph, "Calm day.");
        assert_eq!(d.bullets, vec!["a", "b"]);
        assert_eq!(d.model_used, "sum-model");
    }

    #[test]
    fn cluster_format_truncates_detail() {
        let long = "x".repeat(250);
        let text = format_for_clustering(&[input(5, &long), input(6, "short")]);
        assert!(text.contains("[0] Headline: Headline 5"));
        assert!(text.contains(&format!("Summary: {}...", "x".repeat(200))));
        assert!(!text.contains(&"x".repeat(201)));
        assert!(text.contains("[1] Headline: Headline 6"));
        assert!(text.contains("Published: 2025-03-01 14:05"));
        assert!(text.contains("Symbols: AAPL, MSFT"));
    }

    #[test]
    fn synthesis_format_keeps_full_detail() {
        let long = "y".repeat(250);
        let text = format_for_synthesis(&[input(5, &long)]);
        assert!(text.contains(&long));
        assert!(text.starts_with("Article 1:\n"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé...");
        assert_eq!(truncate_chars("abc", 3), "abc");
    }
}
