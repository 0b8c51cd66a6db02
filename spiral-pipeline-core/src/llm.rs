//! Language-model client and JSON extraction from free-text replies.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::contract::{GenerationOptions, TextGenerator};
use crate::error::LlmError;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

fn fenced_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?[ \t]*\r?\n(.*?)\r?\n[ \t]*```").expect("valid fence regex")
    })
}

/// The body of the first triple-backtick block (optionally tagged `json`), or the
/// whole reply trimmed when there is no fence.
pub fn extract_json_block(raw: &str) -> &str {
    fenced_block()
        .captures(raw)
        .and_then(|c| c.get(1))
        .map_or_else(|| raw.trim(), |m| m.as_str().trim())
}

/// Parses a model reply as JSON, keeping the raw text on failure.
pub fn parse_json_reply<T: DeserializeOwned>(raw: &str) -> Result<T, LlmError> {
    serde_json::from_str(extract_json_block(raw)).map_err(|source| {
        error!(error = %source, "Failed to parse JSON response from model");
        LlmError::MalformedResponse {
            raw: raw.to_string(),
            source,
        }
    })
}

/// `generate_text` followed by [`parse_json_reply`].
pub async fn generate_json<G, T>(
    generator: &G,
    prompt: &str,
    options: &GenerationOptions,
) -> Result<T, LlmError>
where
    G: TextGenerator + ?Sized,
    T: DeserializeOwned,
{
    let raw = generator.generate_text(prompt, options).await?;
    parse_json_reply(&raw)
}

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// [`TextGenerator`] backed by the Anthropic Messages API.
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: ANTHROPIC_API_URL.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl TextGenerator for AnthropicClient {
    async fn generate_text(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        let request = MessageRequest {
            model: &options.model,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };
        debug!(
            model = %options.model,
            max_tokens = options.max_tokens,
            prompt_chars = prompt.len(),
            "Sending generation request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            error!(status = status.as_u16(), message = %message, "LLM provider error");
            return Err(LlmError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let reply: MessageResponse = response.json().await?;
        reply
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or(LlmError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn takes_first_tagged_fence() {
        let raw = "Sure!\n```json\n{\"a\": 1}\n```\nand\n```json\n{\"a\": 2}\n```";
        assert_eq!(extract_json_block(raw), "{\"a\": 1}");
    }

    #[test]
    fn untagged_fence_and_bare_text() {
        assert_eq!(extract_json_block("```\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(extract_json_block("  [3]\n"), "[3]");
    }

    #[test]
    fn malformed_reply_keeps_raw_text() {
        let err = parse_json_reply::<serde_json::Value>("not json at all").unwrap_err();
        match err {
            LlmError::MalformedResponse { raw, .. } => assert_eq!(raw, "not json at all"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
