//! Candidates, populations and concurrent population evaluation.
//!
//! A [`Candidate`] is a prompt plus the actor built from it. Candidates are
//! identified by their prompt text: two candidates with the same prompt are
//! the same candidate, and a [`Population`] never holds duplicates.
//!
//! Populations are immutable values. Each loop step builds a new one
//! instead of editing the previous one in place.
//!
//! [`PopulationEvaluator`] scores every candidate of a population
//! concurrently through a bounded worker pool and acts as a barrier: it
//! returns only when every candidate has settled, with results in
//! population order.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::debug;

use crate::actor::{Actor, ActorFactory};
use crate::fitness::FitnessAggregator;
use crate::test_case::TestCase;
use crate::{Error, Result, Score};

// =============================================================================
// CANDIDATE
// =============================================================================

/// A prompt and the actor derived from it.
#[derive(Clone)]
pub struct Candidate {
    prompt: String,
    actor: Arc<dyn Actor>,
}

impl Candidate {
    /// Build the actor for `prompt` through `factory`.
    pub fn new(prompt: impl Into<String>, factory: &ActorFactory) -> Self {
        let prompt = prompt.into();
        let actor = factory(&prompt);
        Self { prompt, actor }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn actor(&self) -> &dyn Actor {
        self.actor.as_ref()
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.prompt == other.prompt
    }
}

impl Eq for Candidate {}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("prompt", &self.prompt)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// POPULATION
// =============================================================================

/// An ordered set of distinct candidates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Population {
    candidates: Vec<Candidate>,
}

impl Population {
    /// Build candidates from prompts, keeping the first of any duplicates.
    pub fn from_prompts<I, S>(prompts: I, factory: &ActorFactory) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let candidates = prompts
            .into_iter()
            .map(Into::into)
            .filter(|p: &String| seen.insert(p.clone()))
            .map(|p| Candidate::new(p, factory))
            .collect();
        Self { candidates }
    }

    /// Collect candidates, keeping the first of any duplicates.
    pub fn from_candidates(candidates: impl IntoIterator<Item = Candidate>) -> Self {
        let mut seen = HashSet::new();
        Self {
            candidates: candidates
                .into_iter()
                .filter(|c| seen.insert(c.prompt.clone()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    pub fn prompts(&self) -> Vec<&str> {
        self.candidates.iter().map(Candidate::prompt).collect()
    }

    pub fn contains(&self, prompt: &str) -> bool {
        self.candidates.iter().any(|c| c.prompt == prompt)
    }
}

// =============================================================================
// SCORED CANDIDATE
// =============================================================================

/// A candidate paired with its fitness for one generation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub fitness: Score,
    /// Position in the evaluated population; the selection tie-breaker.
    pub index: usize,
    pub failed_cases: usize,
    pub total_cases: usize,
}

impl ScoredCandidate {
    pub fn prompt(&self) -> &str {
        self.candidate.prompt()
    }

    /// A candidate that hard-failed every test case cannot be a parent.
    pub fn is_viable(&self) -> bool {
        self.failed_cases < self.total_cases
    }
}

/// Serializable view of a scored candidate for reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreEntry {
    pub prompt: String,
    pub fitness: Score,
    pub failed_cases: usize,
}

impl From<&ScoredCandidate> for ScoreEntry {
    fn from(scored: &ScoredCandidate) -> Self {
        Self {
            prompt: scored.prompt().to_string(),
            fitness: scored.fitness,
            failed_cases: scored.failed_cases,
        }
    }
}

// =============================================================================
// POPULATION EVALUATOR
// =============================================================================

/// Scores whole populations with a bounded worker pool.
#[derive(Clone)]
pub struct PopulationEvaluator {
    aggregator: FitnessAggregator,
    workers: Option<usize>,
    concurrency_limit: usize,
}

impl PopulationEvaluator {
    /// `workers` defaults to the population size; both are capped by
    /// `concurrency_limit`.
    pub fn new(aggregator: FitnessAggregator, workers: Option<usize>, concurrency_limit: usize) -> Self {
        Self {
            aggregator,
            workers,
            concurrency_limit: concurrency_limit.max(1),
        }
    }

    fn pool_size(&self, population: usize) -> usize {
        self.workers
            .unwrap_or(population)
            .min(self.concurrency_limit)
            .max(1)
    }

    /// Score every candidate. Results follow population order.
    ///
    /// The first fatal error aborts the evaluation; in-flight candidates
    /// are dropped.
    pub async fn evaluate(
        &self,
        population: &Population,
        test_cases: &[TestCase],
    ) -> Result<Vec<ScoredCandidate>> {
        let workers = self.pool_size(population.len());
        debug!(candidates = population.len(), workers, "evaluating population");

        // Each task writes only its own slot.
        let mut slots: Vec<Option<ScoredCandidate>> = (0..population.len()).map(|_| None).collect();

        let mut results = stream::iter(population.candidates().iter().enumerate())
            .map(|(index, candidate)| async move {
                let report = self
                    .aggregator
                    .evaluate(candidate.actor(), test_cases)
                    .await;
                (index, candidate, report)
            })
            .buffer_unordered(workers);

        while let Some((index, candidate, report)) = results.next().await {
            let report = report?;
            debug!(
                index,
                fitness = report.fitness,
                failed = report.failed_cases(),
                "candidate scored"
            );
            slots[index] = Some(ScoredCandidate {
                candidate: candidate.clone(),
                fitness: report.fitness,
                index,
                failed_cases: report.failed_cases(),
                total_cases: report.cases.len(),
            });
        }

        slots
            .into_iter()
            .map(|slot| slot.ok_or_else(|| Error::internal("candidate left unscored")))
            .collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expectation::{Expectation, ExpectationEvaluator};
    use crate::runner::TestCaseRunner;
    use crate::test_case::Turn;
    use crate::test_support::{
        concurrency_probe_factory, failing_factory, prompt_echo_factory, ConcurrencyProbe,
    };
    use std::time::Duration;

    fn evaluator(workers: Option<usize>, limit: usize) -> PopulationEvaluator {
        let runner = TestCaseRunner::new(ExpectationEvaluator::new(None, 0.8));
        PopulationEvaluator::new(FitnessAggregator::new(runner), workers, limit)
    }

    fn hello_case() -> Vec<TestCase> {
        vec![TestCase::new(
            "hello",
            vec![Turn::new("hi").expect(Expectation::contains("hello").unwrap())],
        )
        .unwrap()]
    }

    #[test]
    fn test_population_dedups_by_value() {
        let factory = prompt_echo_factory();
        let population = Population::from_prompts(["a", "b", "a", "c", "b"], &factory);
        assert_eq!(population.prompts(), vec!["a", "b", "c"]);
        assert!(population.contains("c"));
        assert!(!population.contains("d"));
    }

    #[test]
    fn test_candidates_compare_by_prompt() {
        let factory = prompt_echo_factory();
        assert_eq!(Candidate::new("x", &factory), Candidate::new("x", &factory));
        assert_ne!(Candidate::new("x", &factory), Candidate::new("y", &factory));
    }

    #[test]
    fn test_viability() {
        let factory = prompt_echo_factory();
        let scored = ScoredCandidate {
            candidate: Candidate::new("x", &factory),
            fitness: 0.0,
            index: 0,
            failed_cases: 2,
            total_cases: 2,
        };
        assert!(!scored.is_viable());
        assert!(ScoredCandidate {
            failed_cases: 1,
            ..scored
        }
        .is_viable());
    }

    #[tokio::test]
    async fn test_results_follow_population_order() {
        // The echo actor replies with its prompt, so only "hello" prompts match.
        let factory = prompt_echo_factory();
        let population = Population::from_prompts(["nope", "hello there", "hello", "zzz"], &factory);

        let scored = evaluator(None, 8)
            .evaluate(&population, &hello_case())
            .await
            .unwrap();

        let fitness: Vec<f64> = scored.iter().map(|s| s.fitness).collect();
        assert_eq!(fitness, vec![0.0, 1.0, 1.0, 0.0]);
        let indices: Vec<usize> = scored.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(scored[1].prompt(), "hello there");
    }

    #[tokio::test]
    async fn test_worker_pool_is_bounded() {
        let probe = ConcurrencyProbe::new(Duration::from_millis(20));
        let factory = concurrency_probe_factory(probe.clone());
        let prompts: Vec<String> = (0..8).map(|i| format!("p{}", i)).collect();
        let population = Population::from_prompts(prompts, &factory);

        evaluator(None, 3)
            .evaluate(&population, &hello_case())
            .await
            .unwrap();

        assert!(probe.max_seen() <= 3);
        assert!(probe.max_seen() >= 2);
        assert_eq!(probe.calls(), 8);
    }

    #[tokio::test]
    async fn test_failed_candidates_settle_without_error() {
        let factory = failing_factory();
        let population = Population::from_prompts(["a", "b"], &factory);
        let cases: Vec<TestCase> = hello_case()
            .into_iter()
            .map(|c| c.with_retry_budget(1))
            .collect();

        let scored = evaluator(Some(1), 8).evaluate(&population, &cases).await.unwrap();

        assert!(scored.iter().all(|s| !s.is_viable()));
        assert!(scored.iter().all(|s| s.fitness == 0.0));
    }
}
