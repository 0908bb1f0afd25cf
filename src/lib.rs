//! # Actor Optimizer
//!
//! Evolutionary search over the prompts of LLM-backed actors.
//!
//! ## Overview
//!
//! An *actor* is a black box that answers a conversation. Its behavior is
//! steered by a prompt. This crate searches for a better prompt:
//!
//! - **Seed**: start from a handful of candidate prompts
//! - **Evaluate**: replay scripted multi-turn test cases against every
//!   candidate and score the replies
//! - **Select**: keep the best-scoring candidates
//! - **Regenerate**: refill the population with mutations and
//!   recombinations produced by a genetic operator
//!
//! The loop repeats for a fixed number of generations and returns the best
//! prompt ever observed.
//!
//! ## Architecture
//!
//! ```text
//!   seed prompts
//!        |
//!        v
//! +------------------+      +------------------+
//! |    Optimizer     |----->|    Regenerator   |--> GeneticOperator
//! +------------------+      +------------------+
//!        |                           ^
//!        v                           |
//! +------------------+      +------------------+
//! |PopulationEvaluator|     |     Selector     |
//! +------------------+      +------------------+
//!        |
//!        v
//! +------------------+
//! | FitnessAggregator|
//! +------------------+
//!        |
//!        v
//! +------------------+      +------------------+
//! |  TestCaseRunner  |----->|       Actor      |
//! +------------------+      +------------------+
//!        |
//!        v
//! +----------------------+
//! | ExpectationEvaluator |--> SimilarityScorer
//! +----------------------+
//! ```
//!
//! Actors, similarity scoring and genetic operators are injected through
//! traits. The [`llm`] module provides OpenAI-compatible implementations for
//! production use.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use actor_optimizer::{
//!     llm_actor_factory, EmbeddingSimilarity, GenerationOptions, LlmGeneticOperator,
//!     OpenAIClient, Optimizer, OptimizerConfig, SimilarityMetric, TestSuite,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let suite = TestSuite::load_from_file("suite.yaml".as_ref())?;
//!     let client = Arc::new(OpenAIClient::builder().build()?);
//!     let config = OptimizerConfig::default();
//!
//!     let factory = llm_actor_factory(client.clone(), GenerationOptions::default());
//!     let operator = Arc::new(LlmGeneticOperator::new(client.clone(), config.genetic.clone())?);
//!     let scorer = Arc::new(EmbeddingSimilarity::new(client, SimilarityMetric::Cosine));
//!
//!     let report = Optimizer::new(config, factory, operator)
//!         .with_scorer(scorer)
//!         .run(&suite.seed_prompts, &suite.test_cases)
//!         .await?;
//!
//!     println!("{}", report.best_prompt);
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod actor;
pub mod config;
pub mod error;
pub mod expectation;
pub mod fitness;
pub mod genetic;
pub mod llm;
pub mod optimizer;
pub mod population;
pub mod recovery;
pub mod regenerator;
pub mod runner;
pub mod selector;
pub mod test_case;
pub mod tracing_setup;

#[cfg(test)]
mod test_support;

// ============================================================================
// Type Aliases
// ============================================================================

/// Type alias for scores and thresholds (0.0 - 1.0 range).
pub type Score = f64;

// Re-exports for convenient access
pub use actor::{actor_factory, llm_actor_factory, Actor, ActorFactory, LlmActor};
pub use config::{
    ConvergenceConfig, GeneticConfig, OptimizerConfig, ScoringPolicy, ShortfallPolicy,
};
pub use error::{Error, Result};
pub use expectation::{
    EmbeddingSimilarity, Expectation, ExpectationEvaluator, ExpectationOutcome,
    ExpectationSpec, SimilarityMetric, SimilarityScorer,
};
pub use fitness::{FitnessAggregator, FitnessReport};
pub use genetic::{parse_prompt_output, GeneticOperator, LlmGeneticOperator};
pub use llm::{
    ChatMessage, EmbeddingClient, GenerationOptions, LLMClient, MessageRole, OpenAIClient,
    OpenAIClientBuilder,
};
pub use optimizer::{
    optimize, BestCandidate, GenerationObserver, GenerationSnapshot, GenerationSummary,
    OptimizationReport, Optimizer, RunError, Termination, TracingObserver,
};
pub use population::{Candidate, Population, PopulationEvaluator, ScoreEntry, ScoredCandidate};
pub use recovery::{CancellationSignal, RetryConfig};
pub use regenerator::{RegenerationResult, Regenerator};
pub use runner::{score_turn, TestCaseResult, TestCaseRunner};
pub use test_case::{TestCase, TestCaseSpec, TestSuite, Turn, TurnSpec};
pub use tracing_setup::{setup_logging, should_use_json};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
