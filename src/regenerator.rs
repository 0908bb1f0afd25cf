//! Regeneration: refilling a population from survivors.
//!
//! Survivors are carried over unchanged (elitism). Empty slots are filled
//! with children from the genetic operator:
//!
//! - one survivor: the child is a mutation of it
//! - two or more: the child recombines two distinct survivors drawn
//!   uniformly at random; the same pair may be drawn again later
//!
//! A child already present in the population is discarded. Every slot gets
//! a bounded number of attempts, each with its own timeout. When a slot
//! cannot be filled the [`ShortfallPolicy`] decides between aborting the run
//! and continuing with a smaller population, in which case the shortfall is
//! recorded in the result.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::actor::ActorFactory;
use crate::config::{OptimizerConfig, ShortfallPolicy};
use crate::genetic::GeneticOperator;
use crate::population::{Candidate, Population};
use crate::recovery::{cancellable, with_timeout, CancellationSignal};
use crate::{Error, Result};

/// A regenerated population and what it cost.
#[derive(Debug, Clone)]
pub struct RegenerationResult {
    pub population: Population,
    /// Slots left empty under the tolerate policy.
    pub shortfall: usize,
    /// Operator calls made.
    pub operator_calls: usize,
    /// Calls that failed, timed out or produced a duplicate.
    pub rejected: usize,
}

/// Fills populations back up to size through a [`GeneticOperator`].
pub struct Regenerator {
    operator: Arc<dyn GeneticOperator>,
    factory: ActorFactory,
    operator_timeout: Duration,
    attempts_per_slot: u32,
    policy: ShortfallPolicy,
    rng: StdRng,
    cancel: CancellationSignal,
}

impl Regenerator {
    pub fn new(operator: Arc<dyn GeneticOperator>, factory: ActorFactory) -> Self {
        Self {
            operator,
            factory,
            operator_timeout: Duration::from_secs(120),
            attempts_per_slot: 4,
            policy: ShortfallPolicy::Abort,
            rng: StdRng::from_entropy(),
            cancel: CancellationSignal::new(),
        }
    }

    /// Take timeout, retry, policy and seed settings from a run config.
    pub fn configured(mut self, config: &OptimizerConfig) -> Self {
        self.operator_timeout = config.operator_timeout();
        self.attempts_per_slot = config.operator_retries + 1;
        self.policy = config.shortfall_policy;
        if let Some(seed) = config.seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        self
    }

    pub fn with_operator_timeout(mut self, timeout: Duration) -> Self {
        self.operator_timeout = timeout;
        self
    }

    /// Extra attempts per slot after the first.
    pub fn with_operator_retries(mut self, retries: u32) -> Self {
        self.attempts_per_slot = retries + 1;
        self
    }

    pub fn with_policy(mut self, policy: ShortfallPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn factory(&self) -> &ActorFactory {
        &self.factory
    }

    /// Build a population of `target_size` from `survivors`.
    ///
    /// # Errors
    ///
    /// - [`Error::GeneticOperator`] with no survivors, or when a slot cannot
    ///   be filled under the abort policy
    /// - [`Error::Cancelled`] when the run is cancelled mid-way
    pub async fn regenerate(
        &mut self,
        survivors: &[Candidate],
        target_size: usize,
    ) -> Result<RegenerationResult> {
        let parents = Population::from_candidates(survivors.iter().cloned());
        if parents.is_empty() {
            return Err(Error::genetic_operator("regeneration needs at least one parent"));
        }

        let mut members: Vec<Candidate> = parents.candidates().to_vec();
        members.truncate(target_size);

        let mut operator_calls = 0;
        let mut rejected = 0;
        let mut shortfall = 0;

        while members.len() < target_size {
            let mut last_problem = String::from("no attempt made");
            let mut filled = false;

            for attempt in 0..self.attempts_per_slot {
                operator_calls += 1;
                match self.breed(parents.candidates()).await {
                    Ok(text) => {
                        let text = text.trim();
                        if text.is_empty() {
                            last_problem = "empty child".to_string();
                        } else if members.iter().any(|c| c.prompt() == text) {
                            last_problem = "duplicate child".to_string();
                        } else {
                            members.push(Candidate::new(text, &self.factory));
                            filled = true;
                            break;
                        }
                        debug!(attempt = attempt + 1, problem = %last_problem, "child rejected");
                    }
                    Err(Error::Cancelled) => return Err(Error::Cancelled),
                    Err(e) if e.is_fatal() && !matches!(e, Error::GeneticOperator(_)) => {
                        return Err(e)
                    }
                    Err(e) => {
                        warn!(attempt = attempt + 1, error = %e, "genetic operator failed");
                        last_problem = e.to_string();
                    }
                }
                rejected += 1;
            }

            if !filled {
                match self.policy {
                    ShortfallPolicy::Abort => {
                        return Err(Error::genetic_operator(format!(
                            "could not fill slot {} of {} after {} attempts: {}",
                            members.len() + 1,
                            target_size,
                            self.attempts_per_slot,
                            last_problem
                        )));
                    }
                    ShortfallPolicy::Tolerate => {
                        shortfall = target_size - members.len();
                        warn!(
                            produced = members.len(),
                            target = target_size,
                            shortfall,
                            "population left short"
                        );
                        break;
                    }
                }
            }
        }

        info!(
            size = members.len(),
            parents = parents.len(),
            operator_calls,
            rejected,
            "population regenerated"
        );

        Ok(RegenerationResult {
            population: Population::from_candidates(members),
            shortfall,
            operator_calls,
            rejected,
        })
    }

    /// One operator call: mutation for a single parent, otherwise
    /// recombination of a random distinct pair.
    async fn breed(&mut self, parents: &[Candidate]) -> Result<String> {
        let call = if parents.len() == 1 {
            let parent = parents[0].prompt();
            debug!(parent, "mutating");
            self.operator.mutate(parent)
        } else {
            let i = self.rng.gen_range(0..parents.len());
            let mut j = self.rng.gen_range(0..parents.len() - 1);
            if j >= i {
                j += 1;
            }
            debug!(first = i, second = j, "recombining");
            self.operator
                .recombine(parents[i].prompt(), parents[j].prompt())
        };

        cancellable(
            &self.cancel,
            with_timeout(self.operator_timeout, call, |ms| Error::OperatorTimeout {
                timeout_ms: ms,
            }),
        )
        .await
    }
}

// =============================================================================
// TESTS
// =============================================================================
