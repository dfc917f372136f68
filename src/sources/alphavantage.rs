use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use time::macros::format_description;
use time::PrimitiveDateTime;

use super::{url_hash_id, SourceAdapter};
use crate::article::ArticleCandidate;

pub const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co";

#[derive(Debug, Deserialize)]
struct Resp {
    #[serde(default)]
    feed: Option<Vec<Item>>,
    #[serde(rename = "Information", default)]
    information: Option<String>,
    #[serde(rename = "Note", default)]
    note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    time_published: String,
    #[serde(default)]
    ticker_sentiment: Vec<TickerSentiment>,
}

#[derive(Debug, Deserialize)]
struct TickerSentiment {
    #[serde(default)]
    ticker: String,
}

/// `20250301T140500`, always UTC.
fn parse_time_published(s: &str) -> Option<DateTime<Utc>> {
    let fmt = format_description!("[year][month][day]T[hour][minute][second]");
    let dt = PrimitiveDateTime::parse(s.trim(), &fmt).ok()?.assume_utc();
    DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), 0)
}

/// AlphaVantage `NEWS_SENTIMENT`.
pub struct AlphaVantageSource {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AlphaVantageSource {
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
        let resp: Resp = serde_json::from_str(body).context("parsing alphavantage json")?;
        let Some(feed) = resp.feed else {
            if let Some(msg) = resp.information.or(resp.note) {
                bail!("alphavantage refused request: {msg}");
            }
            bail!("alphavantage response has no feed");
        };

        Ok(feed
            .into_iter()
            .take(limit)
            .map(|it| ArticleCandidate {
                external_id: url_hash_id(&it.url),
                published_at: parse_time_published(&it.time_published),
                symbols: it
                    .ticker_sentiment
                    .into_iter()
                    .map(|t| t.ticker)
                    .filter(|t| !t.trim().is_empty())
                    .collect(),
                headline: it.title,
                detail: it.summary,
                url: it.url,
                source: "AlphaVantage".to_string(),
                publisher: it.source,
            })
            .collect())
    }
}

#[async_trait]
impl SourceAdapter for AlphaVantageSource {
    async fn fetch(&self, limit: usize) -> Result<Vec<ArticleCandidate>> {
        let limit_param = limit.to_string();
        let body = self
            .client
            .get(format!("{}/query", self.base_url))
            .query(&[
                ("function", "NEWS_SENTIMENT"),
                ("limit", limit_param.as_str()),
                ("sort", "LATEST"),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .context("alphavantage http get")?
            .error_for_status()
            .context("alphavantage http status")?
            .text()
            .await
            .context("alphavantage http body")?;
        Self::parse(&body, limit)
    }

    fn name(&self) -> &str {
        "AlphaVantage"
    }
}
