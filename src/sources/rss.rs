use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use super::{url_hash_id, SourceAdapter};
use crate::article::ArticleCandidate;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    title: Option<String>,
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let dt = OffsetDateTime::parse(ts.trim(), &Rfc2822).ok()?;
    DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), 0)
}

/// Named entities that are valid HTML but not valid XML.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

/// Generic RSS 2.0 feed.
pub struct RssSource {
    client: reqwest::Client,
    name: String,
    url: String,
}

impl RssSource {
    pub fn new(client: reqwest::Client, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
            url: url.into(),
        }
    }

    fn parse(&self, xml: &str, limit: usize) -> Result<Vec<ArticleCandidate>> {
        let rss: Rss = from_str(&scrub_html_entities_for_xml(xml))
            .with_context(|| format!("parsing rss xml from {}", self.name))?;
        let publisher = rss
            .channel
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.name.clone());

        Ok(rss
            .channel
            .item
            .into_iter()
            .take(limit)
            .map(|it| {
                let url = it.link.unwrap_or_default().trim().to_string();
                ArticleCandidate {
                    external_id: it
                        .guid
                        .map(|g| g.trim().to_string())
                        .filter(|g| !g.is_empty())
                        .unwrap_or_else(|| url_hash_id(&url)),
                    headline: it.title.unwrap_or_default(),
                    detail: it.description.unwrap_or_default(),
                    source: self.name.clone(),
                    publisher: publisher.clone(),
                    published_at: it.pub_date.as_deref().and_then(parse_rfc2822),
                    symbols: Vec::new(),
                    url,
                }
            })
            .collect())
    }
}

#[async_trait]
impl SourceAdapter for RssSource {
    async fn fetch(&self, limit: usize) -> Result<Vec<ArticleCandidate>> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("{} http get", self.name))?
            .error_for_status()
            .with_context(|| format!("{} http status", self.name))?
            .text()
            .await
            .with_context(|| format!("{} http body", self.name))?;
        self.parse(&body, limit)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
