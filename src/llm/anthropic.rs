//! Anthropic Messages API backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ChatBackend, ChatRequest};
use crate::error::ModelError;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicBackend {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicBackend {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, ModelError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ModelError::MissingApiKey("anthropic"));
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("zennews/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl ChatBackend for AnthropicBackend {
    async fn complete(&self, req: ChatRequest<'_>) -> Result<String, ModelError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            max_tokens: u32,
            system: &'a str,
            messages: Vec<Msg<'a>>,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            content: Vec<Block>,
        }
        #[derive(Deserialize)]
        struct Block {
            #[serde(rename = "type")]
            kind: String,
            #[serde(default)]
            text: String,
        }

        let body = Req {
            model: req.model,
            max_tokens: req.max_tokens,
            system: req.system,
            messages: vec![Msg {
                role: "user",
                content: req.user,
            }],
        };

        let resp = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: Resp = resp.json().await?;
        parsed
            .content
            .into_iter()
            .find(|b| b.kind == "text" && !b.text.trim().is_empty())
            .map(|b| b.text)
            .ok_or(ModelError::Empty)
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn returns_first_text_block() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "ak-test"))
            .and(header("anthropic-version", API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [
                    {"type": "thinking", "text": "hmm"},
                    {"type": "text", "text": "{\"headline\":\"x\"}"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = AnthropicBackend::new("ak-test", Duration::from_secs(5))
            .unwrap()
            .with_base_url(server.uri());
        let out = backend
            .complete(ChatRequest {
                model: "claude-haiku",
                system: "sys",
                user: "hi",
                max_tokens: 1024,
            })
            .await
            .unwrap();
        assert_eq!(out, "{\"headline\":\"x\"}");
    }

    #[tokio::test]
    async fn missing_text_block_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"content": []})))
            .mount(&server)
            .await;

        let backend = AnthropicBackend::new("ak-test", Duration::from_secs(5))
            .unwrap()
            .with_base_url(server.uri());
        let res = backend
            .complete(ChatRequest {
                model: "m",
                system: "s",
                user: "u",
                max_tokens: 16,
            })
            .await;
        assert!(matches!(res, Err(ModelError::Empty)));
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(matches!(
            AnthropicBackend::new("", Duration::from_secs(1)),
            Err(ModelError::MissingApiKey("anthropic"))
        ));
    }
}
