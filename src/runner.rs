//! Test case runner.
//!
//! Replays one scripted conversation against one actor. Turns run strictly
//! in order: the history sent for turn *i+1* holds the reply the actor
//! actually produced for turn *i*.
//!
//! Each actor call:
//! - waits for a permit from the run-wide concurrency limiter
//! - is bounded by the actor timeout
//! - aborts as soon as the run is cancelled
//!
//! A failing call is retried with the same input up to the test case's
//! retry budget (budget `n` means `n + 1` attempts). Exhausting it marks the
//! test case failed, scores the turn 0 and skips the remaining turns.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::actor::Actor;
use crate::config::ScoringPolicy;
use crate::expectation::{ExpectationEvaluator, ExpectationOutcome};
use crate::llm::ChatMessage;
use crate::recovery::{cancellable, with_timeout, CancellationSignal};
use crate::test_case::TestCase;
use crate::{Error, Result, Score};

const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_ACTOR_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_CONCURRENCY: usize = 8;

// =============================================================================
// RESULTS
// =============================================================================

/// Outcome of one test case for one actor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestCaseResult {
    pub name: String,
    /// One score per scripted turn; skipped turns score 0.
    pub turn_scores: Vec<Score>,
    /// The retry budget of some turn was exhausted.
    pub failed: bool,
    /// Mean of `turn_scores`.
    pub score: Score,
    /// Actor calls made, retries included.
    pub attempts: u32,
}

/// Combine expectation outcomes into a turn score.
///
/// With gating on, a failed critical expectation yields the policy's
/// failure score. Otherwise the score is the mean of all expectation
/// scores. A turn without expectations scores 1.0.
pub fn score_turn(outcomes: &[ExpectationOutcome], policy: &ScoringPolicy) -> Score {
    if outcomes.is_empty() {
        return 1.0;
    }
    if policy.gate_on_critical && outcomes.iter().any(|o| o.critical && !o.matched) {
        return policy.critical_failure_score;
    }
    outcomes.iter().map(|o| o.score).sum::<f64>() / outcomes.len() as f64
}

// =============================================================================
// RUNNER
// =============================================================================

/// Replays test cases against actors.
///
/// Cheap to clone; clones share the concurrency limiter and the
/// cancellation signal.
#[derive(Clone)]
pub struct TestCaseRunner {
    evaluator: ExpectationEvaluator,
    scoring: ScoringPolicy,
    default_retries: u32,
    actor_timeout: Duration,
    limiter: Arc<Semaphore>,
    cancel: CancellationSignal,
}

impl TestCaseRunner {
    pub fn new(evaluator: ExpectationEvaluator) -> Self {
        Self {
            evaluator,
            scoring: ScoringPolicy::default(),
            default_retries: DEFAULT_RETRIES,
            actor_timeout: DEFAULT_ACTOR_TIMEOUT,
            limiter: Arc::new(Semaphore::new(DEFAULT_CONCURRENCY)),
            cancel: CancellationSignal::new(),
        }
    }

    pub fn with_scoring(mut self, scoring: ScoringPolicy) -> Self {
        self.scoring = scoring;
        self
    }

    /// Retry budget for test cases that do not set one.
    pub fn with_default_retries(mut self, retries: u32) -> Self {
        self.default_retries = retries;
        self
    }

    pub fn with_actor_timeout(mut self, timeout: Duration) -> Self {
        self.actor_timeout = timeout;
        self
    }

    /// Share a limiter on simultaneous actor calls.
    pub fn with_limiter(mut self, limiter: Arc<Semaphore>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn evaluator(&self) -> &ExpectationEvaluator {
        &self.evaluator
    }

    pub fn cancellation(&self) -> &CancellationSignal {
        &self.cancel
    }

    /// Replay `case` against `actor`.
    ///
    /// # Errors
    ///
    /// Only fatal conditions surface as errors: cancellation, an unavailable
    /// scoring backend, or a fatal actor error such as failed authentication.
    /// Exhausted retries are reported through [`TestCaseResult::failed`].
    pub async fn run(&self, actor: &dyn Actor, case: &TestCase) -> Result<TestCaseResult> {
        let retries = case.retries_or(self.default_retries);
        let turn_count = case.turns().len();
        let mut history: Vec<ChatMessage> = Vec::with_capacity(turn_count * 2);
        let mut turn_scores = Vec::with_capacity(turn_count);
        let mut attempts = 0u32;
        let mut failed = false;

        for (index, turn) in case.turns().iter().enumerate() {
            history.push(ChatMessage::user(turn.input.clone()));

            let mut reply = None;
            for attempt in 0..=retries {
                attempts += 1;
                match self.call_actor(actor, &history).await {
                    Ok(text) => {
                        reply = Some(text);
                        break;
                    }
                    Err(Error::Cancelled) => return Err(Error::Cancelled),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!(
                            case = case.name(),
                            turn = index,
                            attempt = attempt + 1,
                            of = retries + 1,
                            error = %e,
                            "actor call failed"
                        );
                    }
                }
            }

            let Some(reply) = reply else {
                debug!(
                    case = case.name(),
                    turn = index,
                    skipped = turn_count - index - 1,
                    "retry budget exhausted"
                );
                failed = true;
                break;
            };

            let mut outcomes = Vec::with_capacity(turn.expectations.len());
            for expectation in &turn.expectations {
                outcomes.push(self.evaluator.score(expectation, &reply).await?);
            }
            let score = score_turn(&outcomes, &self.scoring);
            debug!(case = case.name(), turn = index, score, "turn scored");

            turn_scores.push(score);
            history.push(ChatMessage::assistant(reply));
        }

        // Failed and skipped turns score 0.
        turn_scores.resize(turn_count, 0.0);
        let score = turn_scores.iter().sum::<f64>() / turn_count.max(1) as f64;

        Ok(TestCaseResult {
            name: case.name().to_string(),
            turn_scores,
            failed,
            score,
            attempts,
        })
    }

    async fn call_actor(&self, actor: &dyn Actor, history: &[ChatMessage]) -> Result<String> {
        let _permit = cancellable(&self.cancel, async {
            self.limiter
                .acquire()
                .await
                .map_err(|_| Error::internal("actor limiter closed"))
        })
        .await?;

        cancellable(
            &self.cancel,
            with_timeout(self.actor_timeout, actor.respond(history), |ms| {
                Error::ActorTimeout { timeout_ms: ms }
            }),
        )
        .await
    }
}

// =============================================================================
// TESTS
// =============================================================================
