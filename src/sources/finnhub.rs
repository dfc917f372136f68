use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{split_symbols, SourceAdapter};
use crate::article::ArticleCandidate;

pub const DEFAULT_BASE_URL: &str = "https://finnhub.io";

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(default)]
    id: i64,
    #[serde(default)]
    headline: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    datetime: i64,
    #[serde(default)]
    source: String,
    #[serde(default)]
    related: String,
}

/// FinnHub general market news.
pub struct FinnHubSource {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl FinnHubSource {
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
        let items: Vec<Item> = serde_json::from_str(body).context("parsing finnhub news json")?;
        Ok(items
            .into_iter()
            .take(limit)
            .map(|it| ArticleCandidate {
                external_id: it.id.to_string(),
                headline: it.headline,
                detail: it.summary,
                url: it.url,
                source: "FinnHub".to_string(),
                publisher: it.source,
                published_at: DateTime::<Utc>::from_timestamp(it.datetime, 0)
                    .filter(|_| it.datetime > 0),
                symbols: split_symbols(&it.related),
            })
            .collect())
    }
}

#[async_trait]
impl SourceAdapter for FinnHubSource {
    async fn fetch(&self, limit: usize) -> Result<Vec<ArticleCandidate>> {
        let body = self
            .client
            .get(format!("{}/api/v1/news", self.base_url))
            .query(&[("category", "general")])
            .header("X-Finnhub-Token", &self.api_key)
            .send()
            .await
            .context("finnhub http get")?
            .error_for_status()
            .context("finnhub http status")?
            .text()
            .await
            .context("finnhub http body")?;
        Self::parse(&body, limit)
    }

    fn name(&self) -> &str {
        "FinnHub"
    }
}
