//! # contract: the two outbound seams of the pipeline
//!
//! Every network call the pipeline makes goes through one of two traits:
//!
//! - [`TextGenerator`]: one prompt in, free text out (the hosted language model).
//! - [`MailTransport`]: one JSON request in, status + body out (the mailing-list API).
//!
//! Real implementations live in [`crate::llm`] and [`crate::mailing`]. Both traits
//! carry `mockall` mocks (exported with the `test-export-mocks` feature) so the
//! generators, enrichers and the campaign client can be driven deterministically
//! in tests without any HTTP.

use async_trait::async_trait;
use mockall::automock;
use serde_json::Value;

use crate::error::{LlmError, TransportError};

pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-20241022";

/// Per-call knobs for a generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

impl GenerationOptions {
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A hosted language model that turns a single user prompt into text.
///
/// Implementations must not retry; a failed call surfaces as [`LlmError`] and the
/// caller decides whether the item is skipped or the run aborts.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, LlmError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

/// One request against the mailing-list API, path already resolved to a full URL.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A single authenticated HTTP round trip. Retry policy lives above this trait,
/// in [`crate::mailing::MailingClient`].
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}
