//! Deterministic backend for local dry runs (`llm.provider = "mock"`).
//! Never touches the network.

use async_trait::async_trait;
use serde_json::json;

use super::prompts::{CLUSTER_SYSTEM, NORMALIZE_SYSTEM, SUMMARY_SYSTEM, SYNTHESIZE_SYSTEM};
use super::{ChatBackend, ChatRequest};
use crate::error::ModelError;

#[derive(Debug, Clone, Default)]
pub struct MockBackend;

fn field<'a>(text: &'a str, label: &str) -> &'a str {
    text.lines()
        .find_map(|l| l.trim_start().strip_prefix(label))
        .map(str::trim)
        .unwrap_or("")
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn complete(&self, req: ChatRequest<'_>) -> Result<String, ModelError> {
        let body = if req.system == NORMALIZE_SYSTEM {
            json!({
                "headline": field(req.user, "Headline:"),
                "summary": field(req.user, "Summary:"),
                "category": "Company News",
                "sentiment_score": 3
            })
        } else if req.system == SUMMARY_SYSTEM {
            json!({
                "paragraph": "Markets were mixed (mock).",
                "bullets": req.user.lines()
                    .filter_map(|l| l.strip_prefix("Headline: "))
                    .take(5)
                    .collect::<Vec<_>>()
            })
        } else if req.system == CLUSTER_SYSTEM {
            let n = req.user.lines().filter(|l| l.starts_with('[')).count();
            json!({
                "clusters": [{
                    "topic": "All news (mock)",
                    "article_indices": (0..n).collect::<Vec<_>>(),
                    "importance_reason": "single mock cluster"
                }]
            })
        } else if req.system == SYNTHESIZE_SYSTEM {
            json!({
                "stories": [{
                    "headline": field(req.user, "Headline:"),
                    "summary": field(req.user, "Summary:"),
                    "publishers": [field(req.user, "Publisher:")]
                }]
            })
        } else {
            return Err(ModelError::Empty);
        };
        Ok(body.to_string())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
