//! Ingestion producer: pull from every source adapter, insert-if-absent by
//! URL, enqueue what was new.

pub mod scheduler;
pub mod sweep;

use std::sync::Arc;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::article::ArticleCandidate;
use crate::queue::WorkQueue;
use crate::sources::SourceAdapter;
use crate::store::{ArticleStore, InsertOutcome};

/// Longest detail kept on ingest, in characters.
pub const MAX_DETAIL_CHARS: usize = 4000;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_saved_total", "New raw articles stored.");
        describe_counter!("ingest_duplicate_total", "Candidates whose URL was already stored.");
        describe_counter!("ingest_errors_total", "Candidates that could not be stored.");
        describe_counter!("ingest_source_errors_total", "Source adapter fetch failures.");
        describe_counter!(
            "queue_enqueue_failures_total",
            "Stored articles whose id could not be pushed; left for the sweep."
        );
        describe_counter!("ingest_runs_total", "Scheduled ingest cycles.");
        describe_gauge!("ingest_last_run_ts", "Unix ts when ingest last ran.");
    });
}

/// Decode entities, strip tags, normalize quotes and collapse whitespace.
pub fn clean_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > MAX_DETAIL_CHARS {
        out = out.chars().take(MAX_DETAIL_CHARS).collect();
    }
    out
}

fn clean_candidate(mut c: ArticleCandidate) -> ArticleCandidate {
    c.headline = clean_text(&c.headline);
    c.detail = clean_text(&c.detail);
    c.url = c.url.trim().to_string();
    c.publisher = c.publisher.trim().to_string();
    c
}

/// Per-source tallies for one ingest cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub saved: usize,
    pub duplicate: usize,
    pub errors: usize,
    /// Stored but not pushed; the sweep will pick these up.
    pub enqueue_failed: usize,
    /// The adapter itself failed; nothing was processed for this source.
    pub fetch_failed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub sources: Vec<SourceReport>,
}

impl IngestReport {
    pub fn saved(&self) -> usize {
        self.sources.iter().map(|s| s.saved).sum()
    }
    pub fn duplicate(&self) -> usize {
        self.sources.iter().map(|s| s.duplicate).sum()
    }
    pub fn errors(&self) -> usize {
        self.sources
            .iter()
            .map(|s| s.errors + usize::from(s.fetch_failed))
            .sum()
    }
}

/// Store and enqueue one source's candidates.
pub async fn ingest_candidates(
    source: &str,
    candidates: Vec<ArticleCandidate>,
    store: &ArticleStore,
    queue: &dyn WorkQueue,
) -> SourceReport {
    ensure_metrics_described();
    let mut report = SourceReport {
        source: source.to_string(),
        ..SourceReport::default()
    };

    for candidate in candidates.into_iter().map(clean_candidate) {
        if candidate.url.is_empty() {
            tracing::warn!(source, headline = %candidate.headline, "candidate without url");
            report.errors += 1;
            counter!("ingest_errors_total").increment(1);
            continue;
        }

        match store.insert_if_absent(&candidate).await {
            Ok(InsertOutcome::Inserted(id)) => {
                report.saved += 1;
                counter!("ingest_saved_total").increment(1);
                if let Err(e) = queue.enqueue(id).await {
                    tracing::warn!(error = %e, article_id = id, source, "enqueue failed; left pending");
                    report.enqueue_failed += 1;
                    counter!("queue_enqueue_failures_total").increment(1);
                }
            }
            Ok(InsertOutcome::Duplicate) => {
                report.duplicate += 1;
                counter!("ingest_duplicate_total").increment(1);
            }
            Err(e) => {
                tracing::error!(error = %e, source, url = %candidate.url, "failed to store article");
                report.errors += 1;
                counter!("ingest_errors_total").increment(1);
            }
        }
    }
    report
}

/// Run one ingest cycle across all sources. A failing source is logged and
/// skipped; the others still run.
pub async fn run_once(
    sources: &[Arc<dyn SourceAdapter>],
    store: &ArticleStore,
    queue: &dyn WorkQueue,
    limit: usize,
) -> IngestReport {
    ensure_metrics_described();
    let mut report = IngestReport::default();

    for src in sources {
        let name = src.name().to_string();
        let source_report = match src.fetch(limit).await {
            Ok(candidates) => {
                tracing::debug!(source = %name, fetched = candidates.len(), "fetched");
                ingest_candidates(&name, candidates, store, queue).await
            }
            Err(e) => {
                tracing::warn!(error = ?e, source = %name, "source fetch failed");
                counter!("ingest_source_errors_total").increment(1);
                SourceReport {
                    source: name.clone(),
                    fetch_failed: true,
                    ..SourceReport::default()
                }
            }
        };

        tracing::info!(
            target: "ingest",
            source = %name,
            saved = source_report.saved,
            duplicate = source_report.duplicate,
            errors = source_report.errors,
            "source done"
        );
        report.sources.push(source_report);
    }

    gauge!("ingest_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
    report
}
