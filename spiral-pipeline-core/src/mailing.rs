//! # mailing: campaign client for the mailing-list service
//!
//! [`MailingClient::request`] is the only place in the pipeline that retries:
//!
//! - 2xx: the body is decoded (an empty body decodes as JSON `null`).
//! - 4xx: the caller's request is wrong; returned at once, never retried.
//! - 5xx and transport failures (including the per-attempt timeout): retried
//!   with exponential backoff, `base_delay * 2^attempt` between attempts.
//! - After the last attempt the final failure is wrapped in
//!   [`MailError::Exhausted`].
//!
//! Higher-level calls (`create_campaign`, `set_status`, `send_test`,
//! `send_newsletter`) are thin compositions of `request`.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::contract::{HttpMethod, MailTransport, TransportRequest, TransportResponse};
use crate::error::{MailError, TransportError};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Wait after failed attempt number `attempt` (1-based): 2s, 4s, 8s, ...
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// [`MailTransport`] over HTTPS with Basic authentication.
pub struct HttpTransport {
    client: Client,
    username: String,
    password: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self {
            client,
            username: username.into(),
            password: password.into(),
            timeout: REQUEST_TIMEOUT,
        })
    }
}

#[async_trait]
impl MailTransport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
            HttpMethod::Put => self.client.put(&request.url),
        };
        let mut builder = builder.basic_auth(&self.username, Some(&self.password));
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                TransportError::Timeout(self.timeout)
            } else {
                TransportError::Network(e.to_string())
            }
        };
        let response = builder.send().await.map_err(map_err)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_err)?;
        Ok(TransportResponse { status, body })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Running,
    Paused,
    Cancelled,
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Scheduled => "scheduled",
            CampaignStatus::Running => "running",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailingList {
    pub id: u64,
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct ListsPage {
    results: Vec<MailingList>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewCampaign {
    pub name: String,
    pub subject: String,
    pub lists: Vec<u64>,
    #[serde(rename = "type")]
    pub campaign_type: String,
    pub content_type: String,
    pub body: String,
    pub send_at: Option<String>,
    pub messenger: String,
}

impl NewCampaign {
    /// A regular HTML email campaign.
    pub fn html(name: impl Into<String>, subject: impl Into<String>, lists: Vec<u64>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subject: subject.into(),
            lists,
            campaign_type: "regular".to_string(),
            content_type: "html".to_string(),
            body: body.into(),
            send_at: None,
            messenger: "email".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Everything `send_newsletter` needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SendRequest {
    pub name: String,
    pub subject: String,
    pub html: String,
    pub list_ids: Vec<u64>,
    pub send_at: Option<String>,
    pub test_emails: Vec<String>,
}

pub struct MailingClient<T> {
    transport: T,
    base_url: String,
    retry: RetryPolicy,
}

impl<T: MailTransport> MailingClient<T> {
    pub fn new(transport: T, base_url: &str) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn classify(response: TransportResponse) -> Result<String, MailError> {
        match response.status {
            _ if response.is_success() => Ok(response.body),
            s @ 400..=499 => Err(MailError::Client {
                status: s,
                body: response.body,
            }),
            s => Err(MailError::Server {
                status: s,
                body: response.body,
            }),
        }
    }

    /// One API call with the retry policy applied.
    pub async fn request<R: DeserializeOwned>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
    ) -> Result<R, MailError> {
        let request = TransportRequest {
            method,
            url: self.url(path),
            body,
        };
        let attempts = self.retry.attempts.max(1);
        let mut last = None;

        for attempt in 1..=attempts {
            debug!(attempt, url = %request.url, "Mailing API request");
            let result = match self.transport.send(request.clone()).await {
                Ok(response) => Self::classify(response),
                Err(e) => Err(MailError::Transport(e)),
            };
            match result {
                Ok(text) => {
                    let text = if text.trim().is_empty() { "null".to_string() } else { text };
                    return serde_json::from_str(&text)
                        .map_err(|source| MailError::Decode { body: text, source });
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if attempt < attempts {
                        let delay = self.retry.delay_after(attempt);
                        warn!(attempt, attempts, error = %e, delay = ?delay, "Mailing API attempt failed, retrying");
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                    last = Some(e);
                }
            }
        }

        Err(MailError::Exhausted {
            attempts,
            last: Box::new(last.unwrap_or(MailError::Transport(TransportError::Network(
                "no attempt was made".to_string(),
            )))),
        })
    }

    pub async fn get_lists(&self) -> Result<Vec<MailingList>, MailError> {
        let page: Envelope<ListsPage> = self.request(HttpMethod::Get, "/lists", None).await?;
        Ok(page.data.results)
    }

    pub async fn create_campaign(&self, campaign: &NewCampaign) -> Result<Campaign, MailError> {
        let body = serde_json::to_value(campaign).map_err(|source| MailError::Decode {
            body: String::new(),
            source,
        })?;
        let created: Envelope<Campaign> = self
            .request(HttpMethod::Post, "/campaigns", Some(body))
            .await?;
        Ok(created.data)
    }

    pub async fn set_status(&self, campaign_id: u64, status: CampaignStatus) -> Result<(), MailError> {
        let _: Value = self
            .request(
                HttpMethod::Put,
                &format!("/campaigns/{campaign_id}/status"),
                Some(json!({ "status": status })),
            )
            .await?;
        Ok(())
    }

    pub async fn send_test(&self, campaign_id: u64, recipients: &[String]) -> Result<(), MailError> {
        let _: Value = self
            .request(
                HttpMethod::Post,
                &format!("/campaigns/{campaign_id}/test"),
                Some(json!({ "subscribers": recipients })),
            )
            .await?;
        Ok(())
    }

    pub async fn campaign_detail(&self, campaign_id: u64) -> Result<Campaign, MailError> {
        let detail: Envelope<Campaign> = self
            .request(HttpMethod::Get, &format!("/campaigns/{campaign_id}"), None)
            .await?;
        Ok(detail.data)
    }

    /// Create → optional test send → start now, or schedule when `send_at` is set.
    pub async fn send_newsletter(&self, send: &SendRequest) -> Result<Campaign, MailError> {
        info!(name = %send.name, lists = ?send.list_ids, "[MAIL] Creating campaign");
        let mut campaign = NewCampaign::html(&send.name, &send.subject, send.list_ids.clone(), &send.html);
        campaign.send_at = send.send_at.clone();
        let created = self.create_campaign(&campaign).await?;
        info!(campaign_id = created.id, "[MAIL] Campaign created");

        if !send.test_emails.is_empty() {
            info!(recipients = ?send.test_emails, "[MAIL] Sending test emails");
            self.send_test(created.id, &send.test_emails).await?;
        }

        let status = if send.send_at.is_some() {
            CampaignStatus::Scheduled
        } else {
            CampaignStatus::Running
        };
        self.set_status(created.id, status).await?;
        info!(campaign_id = created.id, status = %status, "[MAIL] Campaign status set");
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
    }

    #[test]
    fn campaign_payload_shape() {
        let c = NewCampaign::html("Weekly", "Hello", vec![1, 2], "<p>x</p>");
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["type"], "regular");
        assert_eq!(v["content_type"], "html");
        assert_eq!(v["messenger"], "email");
        assert!(v["send_at"].is_null());
    }
}
