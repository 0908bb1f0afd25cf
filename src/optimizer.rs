//! The optimization loop.
//!
//! ```text
//! seeds ──> Population (gen 0)
//!              |
//!              v
//!   +---> PopulationEvaluator ──> best-ever record, observers, history
//!   |          |
//!   |          v
//!   |      Selector (top-k viable)
//!   |          |
//!   |          v
//!   +---- Regenerator (elitism + children)
//! ```
//!
//! Generations run one after another; everything inside a generation runs
//! concurrently under the run-wide limiter. `generations = G` evaluates G+1
//! populations. The run stops at the generation limit, when the best-ever
//! score stagnates (optional), or when the cancellation signal fires.
//!
//! The returned best candidate is the best ever observed, not the best of
//! the last population.
//!
//! # Example
//!
//! ```rust,ignore
//! use actor_optimizer::{Optimizer, OptimizerConfig};
//!
//! let optimizer = Optimizer::new(OptimizerConfig::default(), factory, operator)
//!     .with_scorer(scorer);
//! let report = optimizer.run(&seeds, &suite.test_cases).await?;
//! println!("{} ({:.3})", report.best_prompt, report.best_score);
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::actor::ActorFactory;
use crate::config::{ConvergenceConfig, OptimizerConfig};
use crate::expectation::{ExpectationEvaluator, SimilarityScorer};
use crate::fitness::FitnessAggregator;
use crate::genetic::GeneticOperator;
use crate::population::{Population, PopulationEvaluator, ScoreEntry, ScoredCandidate};
use crate::recovery::CancellationSignal;
use crate::regenerator::Regenerator;
use crate::runner::TestCaseRunner;
use crate::selector;
use crate::test_case::{validate_test_cases, TestCase};
use crate::{Error, Score};

// =============================================================================
// OBSERVABILITY
// =============================================================================

/// Progress reported after every evaluated generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationSnapshot {
    pub generation: usize,
    pub best_score_so_far: Score,
    pub best_candidate: String,
}

/// Receives a snapshot after every evaluated generation.
pub trait GenerationObserver: Send + Sync {
    fn on_generation(&self, snapshot: &GenerationSnapshot);
}

/// Logs snapshots at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl GenerationObserver for TracingObserver {
    fn on_generation(&self, snapshot: &GenerationSnapshot) {
        info!(
            generation = snapshot.generation,
            best_score_so_far = snapshot.best_score_so_far,
            best_candidate = %snapshot.best_candidate,
            "generation complete"
        );
    }
}

// =============================================================================
// REPORTS
// =============================================================================

/// The best candidate seen so far and where it was found.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestCandidate {
    pub prompt: String,
    pub score: Score,
    pub generation: usize,
}

/// Statistics of one evaluated generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationSummary {
    pub number: usize,
    /// Best viable fitness of this generation.
    pub best_score: Option<Score>,
    pub mean_score: Score,
    pub best_prompt: Option<String>,
    /// Best-ever score after this generation.
    pub best_so_far: Option<Score>,
    pub population_size: usize,
    /// Slots the regenerator could not fill for this population.
    pub shortfall: usize,
    pub candidates: Vec<ScoreEntry>,
}

/// Why the run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    MaxGenerations,
    Converged,
    Cancelled,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxGenerations => write!(f, "max generations reached"),
            Self::Converged => write!(f, "converged"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationReport {
    pub run_id: String,
    pub best_prompt: String,
    pub best_score: Score,
    pub best_generation: usize,
    pub generations_evaluated: usize,
    pub termination: Termination,
    pub history: Vec<GenerationSummary>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl OptimizationReport {
    pub fn summary(&self) -> String {
        format!(
            "Run {}: best score {:.4} (generation {}) after {} generation(s), {} in {}ms",
            self.run_id,
            self.best_score,
            self.best_generation,
            self.generations_evaluated,
            self.termination,
            self.duration_ms
        )
    }
}

/// A run that ended in a fatal error.
///
/// Keeps whatever was learned before the abort.
#[derive(Debug, thiserror::Error)]
#[error("optimization aborted: {error}")]
pub struct RunError {
    #[source]
    pub error: Error,
    pub best: Option<BestCandidate>,
    pub history: Vec<GenerationSummary>,
}

impl RunError {
    fn bare(error: Error) -> Self {
        Self {
            error,
            best: None,
            history: Vec::new(),
        }
    }
}

// =============================================================================
// OPTIMIZER
// =============================================================================

/// Drives the evaluate, select and regenerate loop.
pub struct Optimizer {
    config: OptimizerConfig,
    factory: ActorFactory,
    operator: Arc<dyn GeneticOperator>,
    scorer: Option<Arc<dyn SimilarityScorer>>,
    observers: Vec<Arc<dyn GenerationObserver>>,
    cancel: CancellationSignal,
}

impl Optimizer {
    /// Create an optimizer that logs progress through [`TracingObserver`].
    pub fn new(
        config: OptimizerConfig,
        factory: ActorFactory,
        operator: Arc<dyn GeneticOperator>,
    ) -> Self {
        Self {
            config,
            factory,
            operator,
            scorer: None,
            observers: vec![Arc::new(TracingObserver)],
            cancel: CancellationSignal::new(),
        }
    }

    /// Similarity backend for vector expectations.
    pub fn with_scorer(mut self, scorer: Arc<dyn SimilarityScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn GenerationObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Use an externally controlled cancellation signal.
    pub fn with_cancellation(mut self, cancel: CancellationSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn cancellation(&self) -> &CancellationSignal {
        &self.cancel
    }

    /// Search for the best prompt starting from `seed_prompts`.
    ///
    /// # Errors
    ///
    /// A [`RunError`] carrying the fatal error plus the best-ever candidate
    /// and history recorded before it. Inputs are validated before any actor
    /// is called: no seeds, no test cases, an invalid config, or vector
    /// expectations without a scorer fail immediately.
    pub async fn run<S: AsRef<str>>(
        &self,
        seed_prompts: &[S],
        test_cases: &[TestCase],
    ) -> Result<OptimizationReport, RunError> {
        let seeds = self.validate(seed_prompts, test_cases).map_err(RunError::bare)?;

        let deadline = self.config.deadline().map(|d| self.cancel.cancel_after(d));
        let outcome = self.drive(seeds, test_cases).await;
        if let Some(handle) = deadline {
            handle.abort();
        }
        outcome
    }

    fn validate<S: AsRef<str>>(&self, seed_prompts: &[S], test_cases: &[TestCase]) -> crate::Result<Vec<String>> {
        self.config.validate()?;

        let seeds: Vec<String> = seed_prompts
            .iter()
            .map(|s| s.as_ref().trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if seeds.is_empty() {
            return Err(Error::NoSeedPrompts);
        }

        validate_test_cases(test_cases)?;
        if self.scorer.is_none() && test_cases.iter().any(TestCase::needs_scorer) {
            return Err(Error::scoring_unavailable(
                "vector expectations need a similarity scorer",
            ));
        }
        Ok(seeds)
    }

    async fn drive(
        &self,
        seeds: Vec<String>,
        test_cases: &[TestCase],
    ) -> Result<OptimizationReport, RunError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let run_id = Uuid::new_v4().to_string();

        let seeds = Population::from_prompts(seeds, &self.factory);
        let population_size = self.config.population_size_for(seeds.len());
        let survivor_count = self.config.survivor_count_for(seeds.len());

        info!(
            run_id = %run_id,
            seeds = seeds.len(),
            population_size,
            survivor_count,
            generations = self.config.generations,
            test_cases = test_cases.len(),
            "starting optimization"
        );

        let evaluator = self.population_evaluator(population_size);
        let mut regenerator = Regenerator::new(self.operator.clone(), self.factory.clone())
            .configured(&self.config)
            .with_cancellation(self.cancel.clone());

        let mut state = RunState::default();

        let mut shortfall = 0;
        let mut population = if self.config.fill_initial_population && seeds.len() < population_size {
            match regenerator.regenerate(seeds.candidates(), population_size).await {
                Ok(filled) => {
                    shortfall = filled.shortfall;
                    filled.population
                }
                Err(e) => return Err(state.abort(e)),
            }
        } else {
            seeds
        };

        let mut generation = 0;
        let termination = loop {
            if self.cancel.is_cancelled() {
                break Termination::Cancelled;
            }

            let scored = match evaluator.evaluate(&population, test_cases).await {
                Ok(scored) => scored,
                Err(Error::Cancelled) => break Termination::Cancelled,
                Err(e) => return Err(state.abort(e)),
            };

            state.record(generation, &scored, shortfall);
            if let Some(best) = &state.best {
                let snapshot = GenerationSnapshot {
                    generation,
                    best_score_so_far: best.score,
                    best_candidate: best.prompt.clone(),
                };
                for observer in &self.observers {
                    observer.on_generation(&snapshot);
                }
            }

            if generation >= self.config.generations {
                break Termination::MaxGenerations;
            }
            if let Some(convergence) = &self.config.convergence {
                if has_converged(&state.history, convergence) {
                    info!(generation, "best score stagnated, stopping");
                    break Termination::Converged;
                }
            }

            let survivors = match selector::select(&scored, survivor_count, generation) {
                Ok(survivors) => survivors,
                Err(e) => return Err(state.abort(e)),
            };
            debug!(generation, survivors = survivors.len(), "selected");

            match regenerator.regenerate(&survivors, population_size).await {
                Ok(next) => {
                    shortfall = next.shortfall;
                    population = next.population;
                }
                Err(Error::Cancelled) => break Termination::Cancelled,
                Err(e) => return Err(state.abort(e)),
            }
            generation += 1;
        };

        let generations_evaluated = state.history.len();
        let Some(best) = state.best.clone() else {
            let error = match termination {
                Termination::Cancelled => Error::Cancelled,
                _ => Error::NoSurvivors { generation },
            };
            return Err(state.abort(error));
        };

        if termination == Termination::Cancelled {
            warn!(generations_evaluated, "run cancelled, returning best so far");
        }

        let report = OptimizationReport {
            run_id,
            best_prompt: best.prompt,
            best_score: best.score,
            best_generation: best.generation,
            generations_evaluated,
            termination,
            history: state.history,
            started_at,
            ended_at: Utc::now(),
            duration_ms: clock.elapsed().as_millis() as u64,
        };
        info!("{}", report.summary());
        Ok(report)
    }

    fn population_evaluator(&self, population_size: usize) -> PopulationEvaluator {
        let limiter = Arc::new(Semaphore::new(self.config.concurrency_limit));
        let runner = TestCaseRunner::new(ExpectationEvaluator::new(
            self.scorer.clone(),
            self.config.similarity_threshold,
        ))
        .with_scoring(self.config.scoring)
        .with_default_retries(self.config.max_retries)
        .with_actor_timeout(self.config.actor_timeout())
        .with_limiter(limiter)
        .with_cancellation(self.cancel.clone());

        PopulationEvaluator::new(
            FitnessAggregator::new(runner),
            Some(self.config.workers_for(population_size)),
            self.config.concurrency_limit,
        )
    }
}

/// Best-ever record and history, owned by the loop.
#[derive(Default)]
struct RunState {
    best: Option<BestCandidate>,
    history: Vec<GenerationSummary>,
}

impl RunState {
    fn record(&mut self, generation: usize, scored: &[ScoredCandidate], shortfall: usize) {
        let leader = selector::best(scored);

        if let Some(leader) = leader {
            let improved = self
                .best
                .as_ref()
                .map_or(true, |best| leader.fitness > best.score);
            if improved {
                self.best = Some(BestCandidate {
                    prompt: leader.prompt().to_string(),
                    score: leader.fitness,
                    generation,
                });
            }
        }

        let mean_score = if scored.is_empty() {
            0.0
        } else {
            scored.iter().map(|s| s.fitness).sum::<f64>() / scored.len() as f64
        };

        self.history.push(GenerationSummary {
            number: generation,
            best_score: leader.map(|l| l.fitness),
            mean_score,
            best_prompt: leader.map(|l| l.prompt().to_string()),
            best_so_far: self.best.as_ref().map(|b| b.score),
            population_size: scored.len(),
            shortfall,
            candidates: scored.iter().map(ScoreEntry::from).collect(),
        });
    }

    fn abort(self, error: Error) -> RunError {
        warn!(error = %error, generations = self.history.len(), "optimization aborted");
        RunError {
            error,
            best: self.best,
            history: self.history,
        }
    }
}

/// True once the best-ever score improved by at most `epsilon` over the
/// last `window` generations.
fn has_converged(history: &[GenerationSummary], convergence: &ConvergenceConfig) -> bool {
    if convergence.window == 0 || history.len() <= convergence.window {
        return false;
    }
    let latest = history[history.len() - 1].best_so_far;
    let earlier = history[history.len() - 1 - convergence.window].best_so_far;
    match (latest, earlier) {
        (Some(latest), Some(earlier)) => latest - earlier <= convergence.epsilon,
        _ => false,
    }
}

/// Run the optimizer once and return only the best prompt and its score.
pub async fn optimize<S: AsRef<str>>(
    seed_prompts: &[S],
    test_cases: &[TestCase],
    config: OptimizerConfig,
    factory: ActorFactory,
    operator: Arc<dyn GeneticOperator>,
    scorer: Option<Arc<dyn SimilarityScorer>>,
) -> Result<(String, Score), RunError> {
    let mut optimizer = Optimizer::new(config, factory, operator);
    if let Some(scorer) = scorer {
        optimizer = optimizer.with_scorer(scorer);
    }
    let report = optimizer.run(seed_prompts, test_cases).await?;
    Ok((report.best_prompt, report.best_score))
}

// =============================================================================
// TESTS
// =============================================================================
