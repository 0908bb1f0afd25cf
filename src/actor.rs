//! Actors: the behavior units whose prompts are optimized.
//!
//! An [`Actor`] maps a conversation history to a reply. The engine never
//! looks inside one; it only builds actors from prompt text through an
//! [`ActorFactory`] and replays test conversations against them.
//!
//! [`LlmActor`] is the production implementation: the prompt becomes the
//! system message in front of the history sent to an [`LLMClient`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::llm::{ChatMessage, GenerationOptions, LLMClient};
use crate::{Error, Result};

// =============================================================================
// ACTOR CONTRACT
// =============================================================================

/// A black box that answers a conversation.
///
/// `history` ends with the user message to answer. Failures are transient
/// from the engine's point of view and are retried per turn.
#[async_trait]
pub trait Actor: Send + Sync {
    async fn respond(&self, history: &[ChatMessage]) -> Result<String>;
}

/// Builds an actor from prompt text.
pub type ActorFactory = Arc<dyn Fn(&str) -> Arc<dyn Actor> + Send + Sync>;

/// Wrap a closure as an [`ActorFactory`].
pub fn actor_factory<F>(f: F) -> ActorFactory
where
    F: Fn(&str) -> Arc<dyn Actor> + Send + Sync + 'static,
{
    Arc::new(f)
}

// =============================================================================
// LLM-BACKED ACTOR
// =============================================================================

/// Actor that prepends its prompt as a system message.
pub struct LlmActor {
    prompt: String,
    client: Arc<dyn LLMClient>,
    options: GenerationOptions,
}

impl LlmActor {
    pub fn new(
        prompt: impl Into<String>,
        client: Arc<dyn LLMClient>,
        options: GenerationOptions,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            client,
            options,
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

#[async_trait]
impl Actor for LlmActor {
    async fn respond(&self, history: &[ChatMessage]) -> Result<String> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(self.prompt.clone()));
        messages.extend_from_slice(history);

        // Any transport failure is an actor failure to the runner, which
        // owns the retry budget. Auth problems stay fatal.
        self.client
            .chat(&messages, &self.options)
            .await
            .map_err(|e| match e {
                Error::ApiAuthFailed => e,
                other => Error::actor_failed(other.to_string()),
            })
    }
}

/// Factory producing [`LlmActor`]s that share one client.
pub fn llm_actor_factory(client: Arc<dyn LLMClient>, options: GenerationOptions) -> ActorFactory {
    actor_factory(move |prompt: &str| {
        Arc::new(LlmActor::new(prompt, Arc::clone(&client), options.clone())) as Arc<dyn Actor>
    })
}
