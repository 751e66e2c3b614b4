//! The LLM API client: wire types, transport, retry/backoff, and the two
//! task-specific calls (vision extraction, markdown refinement).
//!
//! ## Retry strategy
//!
//! The endpoint distinguishes three failure families and the client treats
//! them differently:
//!
//! * **429** — rate limited. Sleep `2^attempt × 10 s` (at the default base
//!   delay) and retry; the endpoint is telling us to slow down, so the wait
//!   is twice the generic one.
//! * **5xx / timeout / connection error** — transient. Sleep
//!   `2^attempt × 5 s` and retry.
//! * **any other error status** — non-retriable. Abort immediately with no
//!   sleep; repeating a 400 or 401 only burns budget.
//!
//! Classification is a pure function ([`classify_status`]) and the delay
//! schedule another ([`backoff_delay`]), so the policy is testable without a
//! network. The attempt counter starts at 1 and is bounded by
//! `max_attempts`; exhausting it returns [`ClientError::RetriesExhausted`]
//! rather than panicking or propagating, so a bad page never aborts a run.

use crate::config::PipelineConfig;
use crate::error::{ClientError, PipelineError};
use crate::pipeline::encode::EncodedPage;
use crate::prompts::{refine_user_prompt, EXTRACT_PROMPT, REFINE_SYSTEM_PROMPT};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

// ── Wire types ───────────────────────────────────────────────────────────

/// Chat-completions request payload.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A role-tagged message.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// "system" or "user".
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    /// Create a system message with plain-text content.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create a user message with plain-text content.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create a user message carrying a text block and an image data-URI.
    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Blocks(vec![
                ContentBlock::Text { text: text.into() },
                ContentBlock::ImageUrl {
                    image_url: ImageUrl {
                        url: image_url.into(),
                    },
                },
            ]),
        }
    }
}

/// Message content: plain text or a mixed list of text and image blocks.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// One block of multimodal message content.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Chat-completions response body.
///
/// Both fields default so that a body missing them still deserialises; the
/// absence of usable content is then reported as a
/// [`ClientError::ResponseShape`] instead of a parse error, matching the
/// policy that shape problems are failed calls, not retriable transport
/// errors.
#[derive(Debug, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

impl ChatCompletion {
    /// First choice's message content, if present.
    pub fn content(&self) -> Option<&str> {
        self.choices.first()?.message.content.as_deref()
    }
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Token usage metadata. Logged only, never persisted.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

// ── Transport ────────────────────────────────────────────────────────────

/// A raw HTTP exchange result: the status code and the unparsed body.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

/// Errors below the HTTP layer.
#[derive(Debug, Clone)]
pub enum TransportError {
    /// The attempt exceeded the per-request timeout.
    Timeout,
    /// Connection failure, DNS error, or any other request error.
    Other(String),
}

/// The seam between retry logic and the network.
///
/// Production uses [`HttpTransport`]; tests inject scripted fakes so every
/// retry branch can be exercised without a server.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<HttpReply, TransportError>;
}

/// reqwest-backed transport posting to a single chat-completions endpoint.
pub struct HttpTransport {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpTransport {
    pub fn new(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn send(&self, request: &ChatRequest) -> Result<HttpReply, TransportError> {
        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Other(e.to_string())
            }
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(map_err)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_err)?;

        Ok(HttpReply { status, body })
    }
}

// ── Retry policy ─────────────────────────────────────────────────────────

/// What to do with an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    /// 2xx — parse the body.
    Accept,
    /// 429 — back off at double the transient rate, then retry.
    RetryRateLimited,
    /// 5xx — back off, then retry.
    RetryTransient,
    /// Anything else — abort immediately.
    Fail,
}

/// Map an HTTP status to a retry action. Pure; see module docs.
pub fn classify_status(status: u16) -> RetryAction {
    match status {
        200..=299 => RetryAction::Accept,
        429 => RetryAction::RetryRateLimited,
        500..=599 => RetryAction::RetryTransient,
        _ => RetryAction::Fail,
    }
}

/// Delay before the retry following attempt `attempt` (1-indexed).
///
/// `base * 2^attempt`, doubled again for rate limiting. At the default 5 s
/// base this yields the `2^attempt × 5 s` / `2^attempt × 10 s` schedule.
pub fn backoff_delay(base: Duration, attempt: u32, action: RetryAction) -> Duration {
    let factor = match action {
        RetryAction::RetryRateLimited => 2u32,
        _ => 1u32,
    };
    base.saturating_mul(2u32.saturating_pow(attempt).saturating_mul(factor))
}

// ── Client ───────────────────────────────────────────────────────────────

/// Client for the two LLM tasks, sharing one transport and retry policy.
pub struct OcrClient {
    transport: Arc<dyn ChatTransport>,
    vision_model: String,
    text_model: String,
    vision_temperature: f32,
    vision_max_tokens: u32,
    text_max_tokens: u32,
    max_attempts: u32,
    retry_delay: Duration,
}

impl OcrClient {
    /// Build a client with the production HTTP transport.
    pub fn new(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Build a client over an injected transport (tests, middleware).
    pub fn with_transport(config: &PipelineConfig, transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            transport,
            vision_model: config.vision_model.clone(),
            text_model: config.text_model.clone(),
            vision_temperature: config.vision_temperature,
            vision_max_tokens: config.vision_max_tokens,
            text_max_tokens: config.text_max_tokens,
            max_attempts: config.max_attempts,
            retry_delay: config.retry_delay,
        }
    }

    /// Extract raw text from one page image via the vision model.
    ///
    /// Single user message: the grounding prompt as a text block plus the
    /// page JPEG as an image-URL block. Returns the first choice's content,
    /// trimmed.
    pub async fn extract_text(&self, page: &EncodedPage) -> Result<String, ClientError> {
        let request = ChatRequest {
            model: self.vision_model.clone(),
            messages: vec![ChatMessage::user_with_image(EXTRACT_PROMPT, &page.data_uri)],
            temperature: self.vision_temperature,
            max_tokens: self.vision_max_tokens,
        };

        let completion = self.send_with_backoff(&request).await?;
        let text = completion.content().ok_or_else(|| ClientError::ResponseShape {
            detail: "missing choices[0].message.content".into(),
        })?;
        debug!(model = %self.vision_model, "extraction successful");
        Ok(text.trim().to_string())
    }

    /// Refine raw extracted text into well-formed markdown via the text model.
    ///
    /// Two messages: the fixed system role instruction, then the raw text
    /// embedded in the formatting directives. Temperature 0 keeps the
    /// refinement deterministic so reruns produce byte-identical files.
    pub async fn refine_markdown(&self, raw_text: &str) -> Result<String, ClientError> {
        let request = ChatRequest {
            model: self.text_model.clone(),
            messages: vec![
                ChatMessage::system(REFINE_SYSTEM_PROMPT),
                ChatMessage::user(refine_user_prompt(raw_text)),
            ],
            temperature: 0.0,
            max_tokens: self.text_max_tokens,
        };

        let completion = self.send_with_backoff(&request).await?;
        let text = completion.content().ok_or_else(|| ClientError::ResponseShape {
            detail: "missing choices[0].message.content".into(),
        })?;
        debug!(model = %self.text_model, "refinement successful");
        Ok(text.trim().to_string())
    }

    /// Send one request under the shared retry policy.
    ///
    /// The branch structure mirrors the failure taxonomy exactly; note the
    /// two asymmetries: a timeout sleeps even on the final attempt before
    /// the loop falls out, while a generic transport error on the final
    /// attempt fails immediately without sleeping.
    async fn send_with_backoff(&self, request: &ChatRequest) -> Result<ChatCompletion, ClientError> {
        let mut last_detail = String::from("no attempts made");

        for attempt in 1..=self.max_attempts {
            debug!(model = %request.model, attempt, max = self.max_attempts, "sending request");

            match self.transport.send(request).await {
                Ok(reply) => match classify_status(reply.status) {
                    RetryAction::Accept => match serde_json::from_str::<ChatCompletion>(&reply.body)
                    {
                        Ok(completion) => {
                            if let Some(usage) = completion.usage {
                                info!(
                                    prompt_tokens = usage.prompt_tokens,
                                    completion_tokens = usage.completion_tokens,
                                    "token usage"
                                );
                            }
                            return Ok(completion);
                        }
                        Err(e) => {
                            // A 2xx with an unparseable body is treated like
                            // any other generic failure: retriable while
                            // budget remains, terminal on the last attempt.
                            last_detail = format!("body parse error: {e}");
                            warn!(attempt, "{last_detail}");
                            if attempt == self.max_attempts {
                                return Err(ClientError::RetriesExhausted {
                                    attempts: attempt,
                                    detail: last_detail,
                                });
                            }
                            sleep(backoff_delay(
                                self.retry_delay,
                                attempt,
                                RetryAction::RetryTransient,
                            ))
                            .await;
                        }
                    },
                    RetryAction::RetryRateLimited => {
                        let wait =
                            backoff_delay(self.retry_delay, attempt, RetryAction::RetryRateLimited);
                        warn!(status = reply.status, wait_secs = wait.as_secs(), "rate limited");
                        last_detail = format!("HTTP {}", reply.status);
                        sleep(wait).await;
                    }
                    RetryAction::RetryTransient => {
                        let wait =
                            backoff_delay(self.retry_delay, attempt, RetryAction::RetryTransient);
                        warn!(status = reply.status, wait_secs = wait.as_secs(), "server error");
                        last_detail = format!("HTTP {}", reply.status);
                        sleep(wait).await;
                    }
                    RetryAction::Fail => {
                        error!(status = reply.status, "non-retriable HTTP error");
                        return Err(ClientError::NonRetriable {
                            status: reply.status,
                        });
                    }
                },
                Err(TransportError::Timeout) => {
                    warn!(attempt, "request timeout");
                    last_detail = "request timeout".into();
                    sleep(backoff_delay(
                        self.retry_delay,
                        attempt,
                        RetryAction::RetryTransient,
                    ))
                    .await;
                }
                Err(TransportError::Other(detail)) => {
                    warn!(attempt, "request error: {detail}");
                    last_detail = detail;
                    if attempt == self.max_attempts {
                        return Err(ClientError::RetriesExhausted {
                            attempts: attempt,
                            detail: last_detail,
                        });
                    }
                    sleep(backoff_delay(
                        self.retry_delay,
                        attempt,
                        RetryAction::RetryTransient,
                    ))
                    .await;
                }
            }
        }

        Err(ClientError::RetriesExhausted {
            attempts: self.max_attempts,
            detail: last_detail,
        })
    }
}
