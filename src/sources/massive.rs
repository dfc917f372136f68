use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{url_hash_id, SourceAdapter};
use crate::article::ArticleCandidate;

pub const DEFAULT_BASE_URL: &str = "https://api.massive.com";

#[derive(Debug, Deserialize)]
struct Resp {
    #[serde(default)]
    results: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    article_url: String,
    #[serde(default)]
    published_utc: String,
    #[serde(default)]
    tickers: Vec<String>,
    #[serde(default)]
    publisher: Publisher,
}

#[derive(Debug, Default, Deserialize)]
struct Publisher {
    #[serde(default)]
    name: String,
}

/// Massive reference news endpoint.
pub struct MassiveSource {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl MassiveSource {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn parse(body: &str, limit: usize) -> Result<Vec<ArticleCandidate>> {
        let resp: Resp = serde_json::from_str(body).context("parsing massive news json")?;
        Ok(resp
            .results
            .into_iter()
            .take(limit)
            .map(|it| ArticleCandidate {
                external_id: if it.id.is_empty() {
                    url_hash_id(&it.article_url)
                } else {
                    it.id
                },
                published_at: DateTime::parse_from_rfc3339(&it.published_utc)
                    .ok()
                    .map(|t| t.with_timezone(&Utc)),
                headline: it.title,
                detail: it.description,
                url: it.article_url,
                source: "Massive".to_string(),
                publisher: it.publisher.name,
                symbols: it.tickers,
            })
            .collect())
    }
}

#[async_trait]
impl SourceAdapter for MassiveSource {
    async fn fetch(&self, limit: usize) -> Result<Vec<ArticleCandidate>> {
        let limit_param = limit.to_string();
        let body = self
            .client
            .get(format!("{}/v2/reference/news", self.base_url))
            .query(&[
                ("limit", limit_param.as_str()),
                ("order", "desc"),
                ("sort", "published_utc"),
                ("apiKey", self.api_key.as_str()),
            ])
            .send()
            .await
            .context("massive http get")?
            .error_for_status()
            .context("massive http status")?
            .text()
            .await
            .context("massive http body")?;
        Self::parse(&body, limit)
    }

    fn name(&self) -> &str {
        "Massive"
    }
}
