//! Pipeline configuration: TOML file, then environment overrides, then
//! validation. API keys may be given as `"ENV"` to read the vendor's
//! environment variable instead.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::digest::DigestMode;
use crate::llm::client::ModelSet;
use crate::logging::LogFormat;

pub const ENV_CONFIG_PATH: &str = "ZENNEWS_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/zennews.toml";

pub const SOURCE_NAMES: &[&str] = &["finnhub", "alphavantage", "massive", "rss"];
pub const LLM_PROVIDERS: &[&str] = &["openai", "anthropic", "mock"];

fn env_marker() -> String {
    "ENV".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    pub name: String,
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Sqlite,
            name: crate::queue::TRANSFORM_QUEUE.to_string(),
            poll_interval_ms: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformSection {
    pub max_attempts: i64,
    pub retry_backoff_secs: u64,
    pub dequeue_timeout_secs: u64,
    pub exit_when_idle: bool,
}

impl Default for TransformSection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff_secs: 5,
            dequeue_timeout_secs: 5,
            exit_when_idle: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSection {
    pub fetch_limit: usize,
    pub sources: Vec<String>,
    /// 0 runs a single cycle and exits.
    pub interval_secs: u64,
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            fetch_limit: 10,
            sources: vec!["finnhub".to_string()],
            interval_secs: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSection {
    pub stale_after_secs: u64,
    pub interval_secs: u64,
}

impl Default for SweepSection {
    fn default() -> Self {
        Self {
            stale_after_secs: 900,
            interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// "openai" | "anthropic" | "mock" (case-insensitive)
    pub provider: String,
    /// "ENV" means: read OPENAI_API_KEY / ANTHROPIC_API_KEY (by provider)
    pub api_key: String,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub normalize_model: Option<String>,
    pub summary_model: Option<String>,
    pub digest_model: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            api_key: env_marker(),
            base_url: None,
            timeout_secs: 60,
            normalize_model: None,
            summary_model: None,
            digest_model: None,
        }
    }
}

impl LlmSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn api_key_env(&self) -> Option<&'static str> {
        match self.provider.as_str() {
            "openai" => Some("OPENAI_API_KEY"),
            "anthropic" => Some("ANTHROPIC_API_KEY"),
            _ => None,
        }
    }

    /// Provider defaults with per-task overrides applied.
    pub fn models(&self) -> ModelSet {
        let (normalize, summary, digest) = match self.provider.as_str() {
            "anthropic" => ("claude-haiku-4-5", "claude-haiku-4-5", "claude-haiku-4-5"),
            "mock" => ("mock", "mock", "mock"),
            _ => ("gpt-4o-mini", "gpt-4o-mini", "gpt-4.1-mini"),
        };
        ModelSet {
            normalize: self.normalize_model.clone().unwrap_or_else(|| normalize.to_string()),
            summary: self.summary_model.clone().unwrap_or_else(|| summary.to_string()),
            digest: self.digest_model.clone().unwrap_or_else(|| digest.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorSection {
    pub api_key: String,
    pub base_url: Option<String>,
}

impl Default for VendorSection {
    fn default() -> Self {
        Self {
            api_key: env_marker(),
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesSection {
    pub timeout_secs: u64,
    pub finnhub: VendorSection,
    pub alphavantage: VendorSection,
    pub massive: VendorSection,
}

impl Default for SourcesSection {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            finnhub: VendorSection::default(),
            alphavantage: VendorSection::default(),
            massive: VendorSection::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RssFeed {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RssSection {
    pub feeds: Vec<RssFeed>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestSection {
    pub mode: DigestMode,
    /// 0 means the whole backlog.
    pub max_batch: usize,
}

impl Default for DigestSection {
    fn default() -> Self {
        Self {
            mode: DigestMode::Stories,
            max_batch: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub database_url: String,
    pub log_format: LogFormat,
    /// Serve `/metrics` and `/health` here when set (transformer only).
    pub metrics_addr: Option<String>,
    pub queue: QueueConfig,
    pub transform: TransformSection,
    pub ingest: IngestSection,
    pub sweep: SweepSection,
    pub llm: LlmSection,
    pub sources: SourcesSection,
    pub rss: RssSection,
    pub digest: DigestSection,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://zennews.db".to_string(),
            log_format: LogFormat::Compact,
            metrics_addr: None,
            queue: QueueConfig::default(),
            transform: TransformSection::default(),
            ingest: IngestSection::default(),
            sweep: SweepSection::default(),
            llm: LlmSection::default(),
            sources: SourcesSection::default(),
            rss: RssSection::default(),
            digest: DigestSection::default(),
        }
    }
}

impl PipelineConfig {
    /// Load using env var + fallback:
    /// 1) $ZENNEWS_CONFIG (must exist)
    /// 2) config/zennews.toml (optional; defaults when absent)
    ///
    /// Environment overrides and validation are applied either way.
    pub fn load() -> Result<Self> {
        let mut cfg = match env::var(ENV_CONFIG_PATH) {
            Ok(p) => {
                let pb = PathBuf::from(p);
                if !pb.exists() {
                    bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
                }
                Self::from_file(&pb)?
            }
            Err(_) => {
                let p = Path::new(DEFAULT_CONFIG_PATH);
                if p.exists() {
                    Self::from_file(p)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_env_overrides()?;
        cfg.normalize();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&data).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = non_empty_env("DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = non_empty_env("ZENNEWS_QUEUE") {
            self.queue.backend = match v.to_ascii_lowercase().as_str() {
                "sqlite" => QueueBackend::Sqlite,
                "memory" => QueueBackend::Memory,
                other => bail!("unsupported queue backend in ZENNEWS_QUEUE: {other}"),
            };
        }
        if let Some(v) = non_empty_env("ZENNEWS_LLM_PROVIDER") {
            self.llm.provider = v;
        }
        if let Some(v) = non_empty_env("ZENNEWS_SOURCES") {
            self.ingest.sources = v.split(',').map(|s| s.to_string()).collect();
        }
        if let Some(v) = non_empty_env("ZENNEWS_LOG_FORMAT") {
            self.log_format = v.parse().map_err(anyhow::Error::msg)?;
        }
        if let Some(v) = non_empty_env("ZENNEWS_METRICS_ADDR") {
            self.metrics_addr = Some(v);
        }
        Ok(())
    }

    /// Lower-case provider and source names, drop blanks and duplicates.
    pub fn normalize(&mut self) {
        self.llm.provider = self.llm.provider.trim().to_lowercase();
        let mut seen = BTreeSet::new();
        self.ingest.sources = self
            .ingest
            .sources
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect();
    }

    pub fn validate(&self) -> Result<()> {
        if self.transform.max_attempts < 1 {
            bail!("transform.max_attempts must be >= 1");
        }
        if self.transform.dequeue_timeout_secs == 0 {
            bail!("transform.dequeue_timeout_secs must be > 0");
        }
        if self.llm.timeout_secs == 0 || self.sources.timeout_secs == 0 {
            bail!("timeouts must be > 0");
        }
        if self.ingest.fetch_limit == 0 {
            bail!("ingest.fetch_limit must be > 0");
        }
        if self.sweep.stale_after_secs == 0 || self.sweep.interval_secs == 0 {
            bail!("sweep intervals must be > 0");
        }
        if !LLM_PROVIDERS.contains(&self.llm.provider.as_str()) {
            bail!("Unsupported llm provider in config: {}", self.llm.provider);
        }
        for s in &self.ingest.sources {
            if !SOURCE_NAMES.contains(&s.as_str()) {
                bail!("Unsupported source in config: {s}");
            }
        }
        if self.ingest.sources.iter().any(|s| s == "rss") && self.rss.feeds.is_empty() {
            bail!("source \"rss\" is enabled but rss.feeds is empty");
        }
        Ok(())
    }

    pub fn transform_config(&self) -> crate::transform::TransformConfig {
        crate::transform::TransformConfig {
            max_attempts: self.transform.max_attempts,
            retry_backoff: Duration::from_secs(self.transform.retry_backoff_secs),
            dequeue_timeout: Duration::from_secs(self.transform.dequeue_timeout_secs),
            exit_when_idle: self.transform.exit_when_idle,
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Resolve a configured key. `"ENV"` (any case) reads `env_var`.
pub fn resolve_api_key(value: &str, env_var: &str) -> Result<String> {
    let key = if value.trim().eq_ignore_ascii_case("env") {
        env::var(env_var).map_err(|_| anyhow::anyhow!("Missing {env_var} env var"))?
    } else {
        value.to_string()
    };
    let key = key.trim().to_string();
    if key.is_empty() {
        bail!("empty api key (expected {env_var} or an explicit key)");
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const OVERRIDES: &[&str] = &[
        ENV_CONFIG_PATH,
        "DATABASE_URL",
        "ZENNEWS_QUEUE",
        "ZENNEWS_LLM_PROVIDER",
        "ZENNEWS_SOURCES",
        "ZENNEWS_LOG_FORMAT",
        "ZENNEWS_METRICS_ADDR",
    ];

    fn clear_env() {
        for k in OVERRIDES {
            env::remove_var(k);
        }
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = PipelineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.transform.max_attempts, 3);
        assert_eq!(cfg.transform.retry_backoff_secs, 5);
        assert_eq!(cfg.sources.timeout_secs, 30);
        assert_eq!(cfg.queue.name, "zennews:queue:transform");
        assert_eq!(cfg.llm.models().digest, "gpt-4.1-mini");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = PipelineConfig::from_toml_str(
            r#"
            database_url = "sqlite::memory:"
            [ingest]
            sources = ["FinnHub", "rss"]
            [[rss.feeds]]
            name = "fed"
            url = "https://fed.example/feed.xml"
            [digest]
            mode = "plain"
            [llm]
            provider = "anthropic"
            digest_model = "claude-sonnet-4-5"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.database_url, "sqlite::memory:");
        assert_eq!(cfg.ingest.fetch_limit, 10);
        assert_eq!(cfg.digest.mode, DigestMode::Plain);
        assert_eq!(cfg.rss.feeds[0].name, "fed");
        let models = cfg.llm.models();
        assert_eq!(models.normalize, "claude-haiku-4-5");
        assert_eq!(models.digest, "claude-sonnet-4-5");
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = PipelineConfig::default();
        cfg.transform.max_attempts = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.ingest.sources = vec!["bloomberg".into()];
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.llm.provider = "claude".into();
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.ingest.sources = vec!["rss".into()];
        assert!(cfg.validate().is_err());
    }

    #[serial]
    #[test]
    fn env_overrides_apply_after_file() {
        clear_env();
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("zennews.toml");
        fs::write(&path, "database_url = \"sqlite://file.db\"\n[llm]\nprovider = \"openai\"\n").unwrap();

        env::set_var(ENV_CONFIG_PATH, &path);
        env::set_var("DATABASE_URL", "sqlite::memory:");
        env::set_var("ZENNEWS_QUEUE", "memory");
        env::set_var("ZENNEWS_LLM_PROVIDER", " Mock ");
        env::set_var("ZENNEWS_SOURCES", "finnhub, massive,finnhub");
        env::set_var("ZENNEWS_LOG_FORMAT", "json");

        let cfg = PipelineConfig::load().unwrap();
        clear_env();

        assert_eq!(cfg.database_url, "sqlite::memory:");
        assert_eq!(cfg.queue.backend, QueueBackend::Memory);
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.ingest.sources, vec!["finnhub", "massive"]);
        assert_eq!(cfg.log_format, LogFormat::Json);
    }

    #[serial]
    #[test]
    fn missing_explicit_path_is_an_error() {
        clear_env();
        env::set_var(ENV_CONFIG_PATH, "/definitely/not/here.toml");
        let res = PipelineConfig::load();
        clear_env();
        assert!(res.is_err());
    }

    #[serial]
    #[test]
    fn env_marker_reads_vendor_variable() {
        env::set_var("ZENNEWS_TEST_KEY", "secret-1");
        assert_eq!(resolve_api_key("ENV", "ZENNEWS_TEST_KEY").unwrap(), "secret-1");
        assert_eq!(resolve_api_key("env", "ZENNEWS_TEST_KEY").unwrap(), "secret-1");
        env::remove_var("ZENNEWS_TEST_KEY");
        assert!(resolve_api_key("ENV", "ZENNEWS_TEST_KEY").is_err());
        assert_eq!(resolve_api_key("literal", "ZENNEWS_TEST_KEY").unwrap(), "literal");
        assert!(resolve_api_key("  ", "ZENNEWS_TEST_KEY").is_err());
    }
}
