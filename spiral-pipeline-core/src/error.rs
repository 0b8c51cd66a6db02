//! Error types shared by the pipeline components.
//!
//! Each component owns a narrow error enum; [`PipelineError`] is the umbrella
//! returned by the orchestration functions in [`crate::pipeline`].

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures talking to, or interpreting output from, the language model.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("LLM transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("LLM response was not valid JSON ({source}); raw response: {raw}")]
    MalformedResponse {
        raw: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("LLM response had unexpected shape, expected {expected}; raw response: {raw}")]
    UnexpectedShape { expected: &'static str, raw: String },

    #[error("LLM provider returned no text content")]
    EmptyResponse,
}

/// Failures reading or writing the flat-file data store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        StoreError::Json {
            path: path.into(),
            source,
        }
    }
}

/// A single HTTP round trip that never produced a status code.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),
}

/// Failures from the mailing-list campaign API.
#[derive(Debug, Error)]
pub enum MailError {
    /// 4xx: the request itself is wrong, never retried.
    #[error("mailing API error: {status} - {body}")]
    Client { status: u16, body: String },

    #[error("mailing server error: {status} - {body}")]
    Server { status: u16, body: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("could not decode mailing API response ({source}): {body}")]
    Decode {
        body: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<MailError> },
}

impl MailError {
    /// Server-class and network failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MailError::Server { .. } | MailError::Transport(_))
    }
}

/// Newsletter generation and send-time validation failures. All fatal.
#[derive(Debug, Error)]
pub enum NewsletterError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("generated newsletter content is too short or empty (got {0} chars)")]
    BodyTooShort(usize),

    #[error("generated subject line is too short or empty (got: {0:?})")]
    SubjectTooShort(String),

    #[error("newsletter HTML is too short ({0} chars)")]
    HtmlTooShort(usize),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Umbrella error for a whole pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Newsletter(#[from] NewsletterError),

    #[error(transparent)]
    Mail(#[from] MailError),
}
