use serde::{Deserialize, Serialize};
use tracing::debug;

use sifter_core::config::{LlmConfig, RetryConfig};
use sifter_core::error::Result;

use crate::http::{check_status, join, parse_error, transport_error};
use crate::retry::with_retry;

const SERVICE: &str = "llm";

/// Minimal OpenAI-compatible chat client that asks for JSON replies.
///
/// Works with OpenAI, Ollama, vLLM, OpenRouter and other servers exposing
/// `/chat/completions`.
pub struct ChatClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    retry: RetryConfig,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatClient {
    pub fn new(config: &LlmConfig, retry: RetryConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            temperature: config.temperature,
            retry,
            http: crate::build_http(config.timeout_secs),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a system + user prompt and parse the reply as JSON.
    pub async fn complete_json(&self, system: &str, user: &str) -> Result<serde_json::Value> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = with_retry(&self.retry, SERVICE, || {
            let mut request = self
                .http
                .post(join(&self.base_url, "chat/completions"))
                .json(&body);
            if let Some(ref key) = self.api_key {
                request = request.bearer_auth(key);
            }
            async move {
                let resp = request
                    .send()
                    .await
                    .map_err(|e| transport_error(SERVICE, e))?;
                let resp = check_status(SERVICE, resp).await?;
                resp.json::<ChatResponse>()
                    .await
                    .map_err(|e| parse_error(SERVICE, e))
            }
        })
        .await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| parse_error(SERVICE, "reply had no message content"))?;

        debug!(model = %self.model, chars = content.len(), "LLM reply received");
        parse_json_reply(&content)
    }
}

/// Parse a model reply as JSON, tolerating a surrounding Markdown code fence.
pub(crate) fn parse_json_reply(content: &str) -> Result<serde_json::Value> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(unfenced.trim()).map_err(|e| parse_error(SERVICE, e))
}
