//! OpenAI-compatible chat and embedding client.
//!
//! Works against any server exposing the `/chat/completions` and
//! `/embeddings` endpoints of the OpenAI API.
//!
//! # Features
//!
//! - **Retry Logic**: Exponential backoff on rate limits, 5xx and network errors
//! - **Status Mapping**: HTTP failures map onto the transport error range
//! - **Statistics**: Request, failure and token counters shared across clones
//!
//! # Environment Variables
//!
//! - `OPENAI_API_KEY`: API key (required unless set on the builder)
//! - `OPENAI_BASE_URL`: Override API endpoint (default: https://api.openai.com/v1)
//! - `OPENAI_MODEL`: Override the chat model
//!
//! # Example
//!
//! ```rust,ignore
//! use actor_optimizer::llm::openai::OpenAIClient;
//!
//! let client = OpenAIClient::builder()
//!     .api_key("sk-...")
//!     .model("gpt-4o-mini")
//!     .build()?;
//!
//! let vector = client.embed("hello").await?;
//! ```

use crate::llm::{ChatMessage, EmbeddingClient, GenerationOptions, LLMClient};
use crate::recovery::{with_retry, RetryConfig};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default OpenAI API endpoint.
pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";

/// Default chat model.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default maximum retry attempts.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 10;

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

// =============================================================================
// USAGE STATISTICS
// =============================================================================

/// Request and token counters.
#[derive(Debug, Default)]
pub struct UsageStats {
    requests: AtomicU64,
    failures: AtomicU64,
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
}

/// Point-in-time copy of [`UsageStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct UsageSnapshot {
    pub requests: u64,
    pub failures: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl UsageStats {
    fn record_success(&self, prompt_tokens: u64, completion_tokens: u64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.prompt_tokens
            .fetch_add(prompt_tokens, Ordering::Relaxed);
        self.completion_tokens
            .fetch_add(completion_tokens, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of the counters.
    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: self.completion_tokens.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// CLIENT BUILDER
// =============================================================================

/// Builder for creating an OpenAI client with custom configuration.
#[derive(Debug, Default)]
pub struct OpenAIClientBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    embedding_model: Option<String>,
    timeout: Option<Duration>,
    retry: Option<RetryConfig>,
}

impl OpenAIClientBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the API key.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the chat model.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the embedding model.
    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the maximum retry attempts, keeping the default backoff.
    pub fn max_retries(mut self, retries: u32) -> Self {
        let retry = self.retry.take().unwrap_or_else(default_retry_config);
        self.retry = Some(RetryConfig {
            max_retries: retries,
            ..retry
        });
        self
    }

    /// Replace the whole retry policy.
    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Build the OpenAI client.
    pub fn build(self) -> Result<OpenAIClient> {
        let api_key = self
            .api_key
            .or_else(|| env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                Error::Config(
                    "OpenAI API key is required. Set OPENAI_API_KEY environment variable or use .api_key()".to_string()
                )
            })?;

        let base_url = self
            .base_url
            .or_else(|| env::var("OPENAI_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_OPENAI_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string();

        let model = self
            .model
            .or_else(|| env::var("OPENAI_MODEL").ok())
            .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());
        let embedding_model = self
            .embedding_model
            .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string());
        let timeout = self
            .timeout
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(DEFAULT_POOL_MAX_IDLE_PER_HOST)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(OpenAIClient {
            http_client,
            api_key,
            base_url,
            model,
            embedding_model,
            timeout,
            retry: self.retry.unwrap_or_else(default_retry_config),
            stats: Arc::new(UsageStats::default()),
        })
    }
}

fn default_retry_config() -> RetryConfig {
    RetryConfig {
        max_retries: DEFAULT_MAX_RETRIES,
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(32),
        backoff_multiplier: 2.0,
        jitter: true,
    }
}

// =============================================================================
// OPENAI CLIENT
// =============================================================================

/// OpenAI-compatible client with automatic retry and usage tracking.
///
/// Clones share the connection pool and statistics.
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    embedding_model: String,
    timeout: Duration,
    retry: RetryConfig,
    stats: Arc<UsageStats>,
}

impl OpenAIClient {
    /// Create a new builder for configuring the client.
    pub fn builder() -> OpenAIClientBuilder {
        OpenAIClientBuilder::new()
    }

    /// Create a new client with default settings.
    ///
    /// Requires `OPENAI_API_KEY` environment variable to be set.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Copy of this client with a different retry policy.
    ///
    /// The copy shares the connection pool and usage statistics.
    pub fn with_retry_config(&self, retry: RetryConfig) -> Self {
        Self {
            retry,
            ..self.clone()
        }
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Embedding model identifier.
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Snapshot of the usage counters.
    pub fn stats(&self) -> UsageSnapshot {
        self.stats.snapshot()
    }

    async fn chat_once(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: options.temperature,
            top_p: options.top_p,
            max_tokens: options.max_tokens,
            seed: options.seed,
            response_format: options
                .json_mode
                .then_some(ResponseFormat { kind: "json_object" }),
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let response = check_status(response).await?;
        let body: ChatResponse = response.json().await?;

        if let Some(usage) = &body.usage {
            self.stats
                .record_success(usage.prompt_tokens, usage.completion_tokens);
        } else {
            self.stats.record_success(0, 0);
        }

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Error::ApiEmptyResponse("no message content in choices".to_string()))
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: text,
        };

        let url = format!("{}/embeddings", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let response = check_status(response).await?;
        let body: EmbeddingResponse = response.json().await?;
        self.stats.record_success(0, 0);

        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::ApiEmptyResponse("no embedding in data".to_string()))
    }

    fn map_send_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::ApiTimeout {
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            Error::Http(e)
        }
    }
}

/// Map a non-success response onto the transport error range.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after_secs = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let text = response.text().await.unwrap_or_default();

    Err(match status.as_u16() {
        401 | 403 => Error::ApiAuthFailed,
        429 => Error::ApiRateLimited { retry_after_secs },
        code => Error::api_response(code, text),
    })
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn chat(&self, messages: &[ChatMessage], options: &GenerationOptions) -> Result<String> {
        debug!(
            model = %self.model,
            messages = messages.len(),
            "chat completion request"
        );
        let result = with_retry(&self.retry, move || self.chat_once(messages, options)).await;
        if result.is_err() {
            self.stats.record_failure();
        }
        result
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl EmbeddingClient for OpenAIClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(model = %self.embedding_model, chars = text.len(), "embedding request");
        let result = with_retry(&self.retry, move || self.embed_once(text)).await;
        if result.is_err() {
            self.stats.record_failure();
        }
        result
    }
}

// =============================================================================
// TESTS
// =============================================================================
