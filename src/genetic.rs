//! Genetic operators: producing new prompts from existing ones.
//!
//! The engine only sees the [`GeneticOperator`] contract. In tests it is a
//! deterministic fake; in production it is [`LlmGeneticOperator`], which asks
//! a chat model to rewrite prompts.
//!
//! # LLM-backed operator
//!
//! - **mutate**: draws a directive (Rephrase, Summarize, ...) by weight and
//!   asks the model to apply it. Each retry runs hotter, following
//!   `base^(1/(attempt+1))`. Output equal to the parent is rejected.
//! - **recombine**: asks the model to merge two prompts into one of about
//!   the same length. Output equal to either parent is rejected. A
//!   successful child is mutated once more with probability
//!   `mutation_rate`. When every attempt fails it falls back to mutating
//!   the first parent.
//!
//! The model is asked for `{"prompt": "..."}`; plain text, optionally inside
//! a code fence, is accepted as well.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::GeneticConfig;
use crate::llm::{ChatMessage, GenerationOptions, LLMClient};
use crate::{Error, Result};

// =============================================================================
// CONTRACT
// =============================================================================

/// Produces new prompt text from one or two parents.
#[async_trait]
pub trait GeneticOperator: Send + Sync {
    async fn mutate(&self, prompt: &str) -> Result<String>;

    async fn recombine(&self, a: &str, b: &str) -> Result<String>;
}

// =============================================================================
// OUTPUT PARSING
// =============================================================================

/// Extract the prompt from model output.
///
/// Accepts `{"prompt": "..."}`, a fenced block holding either form, or bare
/// text. Returns `None` for blank output and for JSON objects without a
/// string `prompt` field.
pub fn parse_prompt_output(raw: &str) -> Option<String> {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        // Drop the info string (```json) and the closing fence.
        let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
        text = body.trim_end().strip_suffix("```").unwrap_or(body).trim();
    }

    if text.starts_with('{') {
        if let Ok(serde_json::Value::Object(fields)) = serde_json::from_str(text) {
            let prompt = fields.get("prompt")?.as_str()?.trim();
            return (!prompt.is_empty()).then(|| prompt.to_string());
        }
    }

    (!text.is_empty()).then(|| text.to_string())
}

// =============================================================================
// LLM-BACKED OPERATOR
// =============================================================================

const MUTATE_INSTRUCTIONS: &str = "You edit system prompts for AI assistants. \
Apply the requested directive to the prompt you are given (rephrase, make random edits, \
summarize, expand, reorder or remove duplicated content as asked) while keeping its purpose. \
Reply with a JSON object of the form {\"prompt\": \"<new prompt>\"} and nothing else.";

const RECOMBINE_INSTRUCTIONS: &str = "You edit system prompts for AI assistants. \
Combine the two prompts you are given into a third prompt of about the same length: \
swap phrases, reword and merge their instructions. \
Reply with a JSON object of the form {\"prompt\": \"<new prompt>\"} and nothing else.";

/// Genetic operator that delegates rewriting to a chat model.
pub struct LlmGeneticOperator {
    client: Arc<dyn LLMClient>,
    config: GeneticConfig,
    directives: Vec<String>,
    weights: WeightedIndex<f64>,
    rng: Mutex<StdRng>,
}

impl LlmGeneticOperator {
    /// Fails when the directive weights cannot form a distribution.
    pub fn new(client: Arc<dyn LLMClient>, config: GeneticConfig) -> Result<Self> {
        let directives: Vec<String> = config.directives.keys().cloned().collect();
        let weights = WeightedIndex::new(config.directives.values().copied()).map_err(|e| {
            Error::config_invalid_value("genetic.directives", e.to_string())
        })?;
        Ok(Self {
            client,
            config,
            directives,
            weights,
            rng: Mutex::new(StdRng::from_entropy()),
        })
    }

    /// Make directive draws and mutation rolls reproducible.
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    pub fn config(&self) -> &GeneticConfig {
        &self.config
    }

    fn draw_directive(&self) -> &str {
        let index = match self.rng.lock() {
            Ok(mut rng) => self.weights.sample(&mut *rng),
            Err(_) => 0,
        };
        &self.directives[index]
    }

    fn roll(&self, probability: f64) -> bool {
        self.rng
            .lock()
            .map(|mut rng| rng.gen_bool(probability.clamp(0.0, 1.0)))
            .unwrap_or(false)
    }

    fn options(&self, attempt: u32) -> GenerationOptions {
        GenerationOptions::default()
            .with_temperature(self.config.temperature_for_attempt(attempt) as f32)
            .with_json_mode()
    }

    /// One model call; `Ok(None)` when the output is unusable.
    async fn ask(&self, instructions: &str, payload: String, attempt: u32) -> Result<Option<String>> {
        let messages = [ChatMessage::system(instructions), ChatMessage::user(payload)];
        match self.client.chat(&messages, &self.options(attempt)).await {
            Ok(raw) => Ok(parse_prompt_output(&raw)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(attempt = attempt + 1, error = %e, "genetic operator call failed");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl GeneticOperator for LlmGeneticOperator {
    async fn mutate(&self, prompt: &str) -> Result<String> {
        for attempt in 0..self.config.mutate_attempts {
            let directive = self.draw_directive().to_string();
            let payload = json!({ "directive": directive, "prompt": prompt }).to_string();

            match self.ask(MUTATE_INSTRUCTIONS, payload, attempt).await? {
                Some(child) if child != prompt => {
                    debug!(%directive, attempt = attempt + 1, "mutation accepted");
                    return Ok(child);
                }
                _ => debug!(%directive, attempt = attempt + 1, "mutation rejected"),
            }
        }

        Err(Error::genetic_operator(format!(
            "mutation produced no new prompt in {} attempts",
            self.config.mutate_attempts
        )))
    }

    async fn recombine(&self, a: &str, b: &str) -> Result<String> {
        for attempt in 0..self.config.recombine_attempts {
            let payload = json!({ "first": a, "second": b }).to_string();

            match self.ask(RECOMBINE_INSTRUCTIONS, payload, attempt).await? {
                Some(child) if child != a && child != b => {
                    debug!(attempt = attempt + 1, "recombination accepted");
                    if self.roll(self.config.mutation_rate) {
                        return match self.mutate(&child).await {
                            Ok(mutated) => Ok(mutated),
                            Err(e) if e.is_fatal() && !matches!(e, Error::GeneticOperator(_)) => {
                                Err(e)
                            }
                            Err(_) => Ok(child),
                        };
                    }
                    return Ok(child);
                }
                _ => debug!(attempt = attempt + 1, "recombination rejected"),
            }
        }

        debug!("recombination exhausted, mutating first parent");
        self.mutate(a).await
    }
}

// =============================================================================
// TESTS
// =============================================================================
