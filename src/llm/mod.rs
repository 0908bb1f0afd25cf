//! # LLM transport contracts
//!
//! Provider-agnostic interfaces for the two things the engine needs from a
//! language-model backend in production wiring:
//!
//! - **Chat completion** ([`LLMClient`]): drives LLM-backed actors and the
//!   LLM-backed genetic operator
//! - **Embeddings** ([`EmbeddingClient`]): drives vector expectations
//!
//! The optimization core never talks to these traits directly; it sees
//! actors, a similarity scorer and a genetic operator. This module is what
//! those adapters are built on.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use actor_optimizer::llm::{ChatMessage, GenerationOptions, LLMClient, OpenAIClient};
//!
//! let client = OpenAIClient::builder()
//!     .api_key("sk-...")
//!     .model("gpt-4o-mini")
//!     .build()?;
//!
//! let reply = client
//!     .chat(&[ChatMessage::user("Hello!")], &GenerationOptions::default())
//!     .await?;
//! ```

pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use openai::{
    OpenAIClient, OpenAIClientBuilder, DEFAULT_EMBEDDING_MODEL, DEFAULT_MAX_RETRIES,
    DEFAULT_OPENAI_ENDPOINT, DEFAULT_OPENAI_MODEL, DEFAULT_TIMEOUT_SECS,
};

// ============================================================================
// SHARED TYPES
// ============================================================================

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message setting context and behavior.
    System,
    /// User message (human input).
    #[default]
    User,
    /// Assistant message (model response).
    Assistant,
}

impl MessageRole {
    /// Returns the string representation of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: MessageRole,
    /// Content of the message.
    pub content: String,
}

impl ChatMessage {
    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Options for text generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Temperature for sampling (0.0 - 2.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Top-p (nucleus) sampling threshold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Maximum number of tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Random seed for reproducibility.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Ask the model for a JSON object.
    #[serde(default)]
    pub json_mode: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: Some(0.7),
            top_p: None,
            max_tokens: None,
            seed: None,
            json_mode: false,
        }
    }
}

impl GenerationOptions {
    /// Create options optimized for deterministic/factual tasks.
    pub fn deterministic() -> Self {
        Self {
            temperature: Some(0.0),
            ..Default::default()
        }
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Request JSON output.
    pub fn with_json_mode(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

// ============================================================================
// CLIENT TRAITS
// ============================================================================

/// Trait for chat-completion providers.
///
/// # Example
///
/// ```rust,ignore
/// use actor_optimizer::llm::LLMClient;
///
/// async fn ask<C: LLMClient>(client: &C, prompt: &str) -> Result<String> {
///     client.complete(prompt, &GenerationOptions::default()).await
/// }
/// ```
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Send a conversation and return the assistant's reply text.
    async fn chat(&self, messages: &[ChatMessage], options: &GenerationOptions)
        -> Result<String>;

    /// Complete a single user prompt.
    async fn complete(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        self.chat(&[ChatMessage::user(prompt)], options).await
    }

    /// Get the provider name (e.g., "openai").
    fn provider_name(&self) -> &'static str;

    /// Get the current model identifier.
    fn model_id(&self) -> &str;
}

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}
