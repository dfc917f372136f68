//! Source adapters: one per vendor, each mapping a vendor payload into
//! [`ArticleCandidate`]s. Errors are per-source and never abort a cycle.

pub mod alphavantage;
pub mod finnhub;
pub mod massive;
pub mod rss;

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::article::ArticleCandidate;

pub use alphavantage::AlphaVantageSource;
pub use finnhub::FinnHubSource;
pub use massive::MassiveSource;
pub use rss::RssSource;

/// Client-level timeout every adapter uses unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Fetch up to `limit` of the newest items.
    async fn fetch(&self, limit: usize) -> Result<Vec<ArticleCandidate>>;
    fn name(&self) -> &str;
}

/// Shared reqwest client for adapters.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("zennews/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .context("building source http client")
}

/// Stable short id derived from a URL: first 16 hex chars of SHA-256.
pub fn url_hash_id(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let mut hex = String::with_capacity(16);
    for b in digest.iter().take(8) {
        hex.push_str(&format!("{b:02x}"));
    }
    hex
}

/// Split a comma list of tickers, dropping blanks.
pub(crate) fn split_symbols(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
