//! Deterministic fakes shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::actor::{actor_factory, Actor, ActorFactory};
use crate::expectation::SimilarityScorer;
use crate::genetic::GeneticOperator;
use crate::llm::{ChatMessage, EmbeddingClient, GenerationOptions, LLMClient};
use crate::{Error, Result};

// =============================================================================
// SCORING
// =============================================================================

/// Reports the same similarity for every pair.
pub struct FixedSimilarity(pub f64);

#[async_trait]
impl SimilarityScorer for FixedSimilarity {
    async fn similarity(&self, _a: &str, _b: &str) -> Result<f64> {
        Ok(self.0)
    }
}

/// Embeds from a fixed table; unknown text is an error.
pub struct MapEmbeddings {
    vectors: HashMap<String, Vec<f32>>,
    calls: AtomicUsize,
}

impl MapEmbeddings {
    pub fn new(entries: &[(&str, Vec<f32>)]) -> Self {
        Self {
            vectors: entries
                .iter()
                .map(|(text, vector)| (text.to_string(), vector.clone()))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingClient for MapEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.vectors
            .get(text)
            .cloned()
            .ok_or_else(|| Error::api_response(400, format!("no embedding for '{}'", text)))
    }
}

// =============================================================================
// ACTORS
// =============================================================================

/// Replies from a script, repeating the last line once it runs out.
pub struct ScriptedActor {
    replies: Vec<String>,
    calls: AtomicUsize,
}

impl ScriptedActor {
    pub fn always(reply: &str) -> Self {
        Self::sequence(&[reply])
    }

    pub fn sequence(replies: &[&str]) -> Self {
        Self {
            replies: replies.iter().map(|r| r.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Actor for ScriptedActor {
    async fn respond(&self, _history: &[ChatMessage]) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let index = call.min(self.replies.len().saturating_sub(1));
        Ok(self.replies.get(index).cloned().unwrap_or_default())
    }
}

/// Replies with the length of the history it was sent.
#[derive(Default)]
pub struct EchoActor {
    lengths: Mutex<Vec<usize>>,
}

impl EchoActor {
    pub fn history_lengths(&self) -> Vec<usize> {
        self.lengths.lock().unwrap().clone()
    }
}

#[async_trait]
impl Actor for EchoActor {
    async fn respond(&self, history: &[ChatMessage]) -> Result<String> {
        self.lengths.lock().unwrap().push(history.len());
        Ok(history.len().to_string())
    }
}

/// Fails the first `failures` calls, then replies.
pub struct FlakyActor {
    failures: usize,
    reply: String,
    calls: AtomicUsize,
}

impl FlakyActor {
    pub fn new(failures: usize, reply: &str) -> Self {
        Self {
            failures,
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Actor for FlakyActor {
    async fn respond(&self, _history: &[ChatMessage]) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(Error::actor_failed(format!("flaky call {}", call + 1)));
        }
        Ok(self.reply.clone())
    }
}

/// Sleeps before replying.
pub struct SlowActor {
    delay: Duration,
}

impl SlowActor {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Actor for SlowActor {
    async fn respond(&self, _history: &[ChatMessage]) -> Result<String> {
        tokio::time::sleep(self.delay).await;
        Ok("late".to_string())
    }
}

struct PromptEcho(String);

#[async_trait]
impl Actor for PromptEcho {
    async fn respond(&self, _history: &[ChatMessage]) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Actors that reply with their own prompt.
pub fn prompt_echo_factory() -> ActorFactory {
    actor_factory(|prompt| Arc::new(PromptEcho(prompt.to_string())))
}

/// Actors that never succeed.
pub fn failing_factory() -> ActorFactory {
    actor_factory(|_| Arc::new(FlakyActor::new(usize::MAX, "")))
}

/// Records how many actor calls overlap.
#[derive(Clone)]
pub struct ConcurrencyProbe {
    delay: Duration,
    current: Arc<AtomicUsize>,
    max: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl ConcurrencyProbe {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            current: Arc::new(AtomicUsize::new(0)),
            max: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn max_seen(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Actor for ConcurrencyProbe {
    async fn respond(&self, _history: &[ChatMessage]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok("probe".to_string())
    }
}

pub fn concurrency_probe_factory(probe: ConcurrencyProbe) -> ActorFactory {
    actor_factory(move |_| Arc::new(probe.clone()))
}

// =============================================================================
// LLM CLIENT
// =============================================================================

/// Answers chat calls from a queue; an empty queue answers with a 503.
pub struct QueueClient {
    replies: Mutex<VecDeque<String>>,
    temperatures: Mutex<Vec<f32>>,
    calls: AtomicUsize,
}

impl QueueClient {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            temperatures: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn temperatures(&self) -> Vec<f32> {
        self.temperatures.lock().unwrap().clone()
    }
}

#[async_trait]
impl LLMClient for QueueClient {
    async fn chat(&self, _messages: &[ChatMessage], options: &GenerationOptions) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(t) = options.temperature {
            self.temperatures.lock().unwrap().push(t);
        }
        let next = self.replies.lock().unwrap().pop_front();
        next.ok_or_else(|| Error::api_response(503, "queue empty"))
    }

    fn provider_name(&self) -> &'static str {
        "queue"
    }

    fn model_id(&self) -> &str {
        "queue-1"
    }
}

// =============================================================================
// GENETIC OPERATORS
// =============================================================================

/// Produces unique children by appending a counter.
#[derive(Default)]
pub struct CountingOperator {
    counter: AtomicUsize,
    mutations: AtomicUsize,
    pairs: Mutex<Vec<(String, String)>>,
}

impl CountingOperator {
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn recombinations(&self) -> usize {
        self.pairs.lock().unwrap().len()
    }

    pub fn pairs(&self) -> Vec<(String, String)> {
        self.pairs.lock().unwrap().clone()
    }

    fn next(&self) -> usize {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl GeneticOperator for CountingOperator {
    async fn mutate(&self, prompt: &str) -> Result<String> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{}~m{}", prompt, self.next()))
    }

    async fn recombine(&self, a: &str, b: &str) -> Result<String> {
        self.pairs
            .lock()
            .unwrap()
            .push((a.to_string(), b.to_string()));
        Ok(format!("{}+{}~r{}", a, b, self.next()))
    }
}

/// An operator that never yields a usable child.
pub enum StuckOperator {
    Answering(String),
    Failing,
    Hanging,
}

impl StuckOperator {
    pub fn answering(text: &str) -> Self {
        Self::Answering(text.to_string())
    }

    pub fn failing() -> Self {
        Self::Failing
    }

    pub fn hanging() -> Self {
        Self::Hanging
    }

    async fn answer(&self) -> Result<String> {
        match self {
            Self::Answering(text) => Ok(text.clone()),
            Self::Failing => Err(Error::genetic_operator("stuck")),
            Self::Hanging => std::future::pending().await,
        }
    }
}

#[async_trait]
impl GeneticOperator for StuckOperator {
    async fn mutate(&self, _prompt: &str) -> Result<String> {
        self.answer().await
    }

    async fn recombine(&self, _a: &str, _b: &str) -> Result<String> {
        self.answer().await
    }
}
