//! Fitness aggregation.
//!
//! A candidate's fitness is the arithmetic mean of its test case scores.
//! Test cases are independent of each other, so they run concurrently; the
//! turns inside each one stay sequential in the runner.

use futures::future::join_all;
use serde::Serialize;

use crate::actor::Actor;
use crate::error::{bail_if, Error};
use crate::runner::{TestCaseResult, TestCaseRunner};
use crate::test_case::TestCase;
use crate::{Result, Score};

/// Fitness of one candidate with its per-case breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitnessReport {
    pub fitness: Score,
    pub cases: Vec<TestCaseResult>,
}

impl FitnessReport {
    /// Test cases whose retry budget ran out.
    pub fn failed_cases(&self) -> usize {
        self.cases.iter().filter(|c| c.failed).count()
    }

    /// Whether every test case hard-failed.
    pub fn all_failed(&self) -> bool {
        !self.cases.is_empty() && self.failed_cases() == self.cases.len()
    }
}

/// Runs every test case for one actor and averages the scores.
#[derive(Clone)]
pub struct FitnessAggregator {
    runner: TestCaseRunner,
}

impl FitnessAggregator {
    pub fn new(runner: TestCaseRunner) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &TestCaseRunner {
        &self.runner
    }

    /// Evaluate `actor` against all `test_cases`.
    ///
    /// Fails with [`Error::NoTestCases`] on an empty slice, and with the
    /// first fatal error raised by any test case.
    pub async fn evaluate(&self, actor: &dyn Actor, test_cases: &[TestCase]) -> Result<FitnessReport> {
        bail_if!(test_cases.is_empty(), Error::NoTestCases);

        let results = join_all(test_cases.iter().map(|case| self.runner.run(actor, case))).await;
        let cases = results.into_iter().collect::<Result<Vec<_>>>()?;

        let fitness = cases.iter().map(|c| c.score).sum::<f64>() / cases.len() as f64;
        Ok(FitnessReport { fitness, cases })
    }
}
