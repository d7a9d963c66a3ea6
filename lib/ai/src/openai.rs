//! OpenAI-compatible HTTP adapter.
//!
//! Implements both [`GenerationBackend`] (`/v1/chat/completions`) and
//! [`EmbeddingBackend`] (`/v1/embeddings`). HTTP 429 responses become
//! `ServiceError::RateLimited` unless the body says the quota is exhausted,
//! which no amount of waiting fixes.

use crate::backend::{
    ChatMessage, EmbeddingBackend, EmbeddingRequest, GenerationBackend, GenerationRequest,
    GenerationResponse, TokenUsage,
};
use crate::embedding::Embedding;
use crate::error::ServiceError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

/// Connection settings for an OpenAI-compatible service.
#[derive(Clone, Deserialize)]
pub struct OpenAiConfig {
    /// Bearer token.
    pub api_key: String,
    /// Base URL, without the `/v1` suffix.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl OpenAiConfig {
    /// Creates a configuration for the public endpoint.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    /// Points the adapter at another OpenAI-compatible server.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// HTTP client for OpenAI-compatible generation and embedding endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    http: Client,
}

impl OpenAiClient {
    const PROVIDER: &'static str = "openai";

    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the API key is empty or the HTTP client
    /// cannot be built.
    pub fn new(config: OpenAiConfig) -> colloquy_core::Result<Self, ServiceError> {
        if config.api_key.trim().is_empty() {
            return Err(ServiceError::InvalidConfig {
                reason: "api_key is empty".to_string(),
            }
            .into());
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ServiceError::InvalidConfig {
                reason: e.to_string(),
            })?;
        Ok(Self { config, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<String, ServiceError> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::Timeout
                } else if e.is_connect() {
                    ServiceError::ProviderUnavailable {
                        provider: Self::PROVIDER.to_string(),
                        reason: e.to_string(),
                    }
                } else {
                    ServiceError::RequestFailed {
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let retry_after_secs = retry_after(response.headers());
        let text = response
            .text()
            .await
            .map_err(|e| ServiceError::ResponseParseFailed {
                reason: e.to_string(),
            })?;

        if status.is_success() {
            return Ok(text);
        }
        Err(classify_failure(status, retry_after_secs, &text))
    }
}

fn retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

fn classify_failure(status: StatusCode, retry_after_secs: Option<u64>, body: &str) -> ServiceError {
    let detail = serde_json::from_str::<ApiErrorBody>(body).ok().map(|b| b.error);
    let code = detail
        .as_ref()
        .and_then(|d| d.code.as_deref().or(d.kind.as_deref()))
        .unwrap_or_default();

    let rate_limited = match status {
        StatusCode::TOO_MANY_REQUESTS => code != "insufficient_quota",
        _ => code == "rate_limit_exceeded",
    };
    if rate_limited {
        return ServiceError::RateLimited { retry_after_secs };
    }

    let message = detail.map_or_else(|| body.to_string(), |d| d.message);
    ServiceError::RequestFailed {
        reason: format!("HTTP {status}: {message}"),
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    model: String,
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Serialize)]
struct EmbeddingBody<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingList {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

fn parse<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T, ServiceError> {
    serde_json::from_str(body).map_err(|e| ServiceError::ResponseParseFailed {
        reason: e.to_string(),
    })
}

#[async_trait]
impl GenerationBackend for OpenAiClient {
    #[instrument(skip_all, fields(model = %request.model, messages = request.messages.len()))]
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, ServiceError> {
        let body = ChatCompletionBody {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
        };
        let completion: ChatCompletion = parse(&self.post("chat/completions", &body).await?)?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ServiceError::ResponseParseFailed {
                reason: "no choices in response".to_string(),
            })?;
        debug!(chars = content.len(), "received completion");

        Ok(GenerationResponse {
            content,
            model: completion.model,
            usage: completion.usage.map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        })
    }

    fn provider(&self) -> &str {
        Self::PROVIDER
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAiClient {
    #[instrument(skip_all, fields(engine = %request.engine))]
    async fn embed(&self, request: &EmbeddingRequest) -> Result<Embedding, ServiceError> {
        let body = EmbeddingBody {
            model: &request.engine,
            input: &request.input,
        };
        let list: EmbeddingList = parse(&self.post("embeddings", &body).await?)?;

        list.data
            .into_iter()
            .next()
            .map(|item| Embedding::new(item.embedding))
            .ok_or_else(|| ServiceError::ResponseParseFailed {
                reason: "no embedding in response".to_string(),
            })
    }
}
