//! Test cases and suite files.
//!
//! A [`TestCase`] is an ordered, scripted conversation: every [`Turn`] sends
//! one user input and checks the reply against a set of expectations. A
//! [`TestSuite`] bundles the seed prompts of a run with its test cases and
//! is what the CLI loads from YAML.
//!
//! All validation happens here, at load time: empty conversations, unknown
//! expectation kinds and malformed regexes are rejected before a single
//! actor call is made.
//!
//! # Suite File Format
//!
//! ```yaml
//! seed_prompts:
//!   - You are a friendly greeter.
//!   - You greet people.
//! test_cases:
//!   - name: greeting
//!     retries: 2
//!     turns:
//!       - input: Say hi
//!         expectations:
//!           - kind: contains
//!             pattern: "(?i)hello"
//!           - kind: vector
//!             target: Hi there
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{bail_if, Error, Result};
use crate::expectation::{Expectation, ExpectationSpec};

// =============================================================================
// TURN
// =============================================================================

/// One user input plus the expectations its reply is scored against.
#[derive(Debug, Clone)]
pub struct Turn {
    pub input: String,
    pub expectations: Vec<Expectation>,
}

impl Turn {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expectations: Vec::new(),
        }
    }

    /// Add an expectation.
    pub fn expect(mut self, expectation: Expectation) -> Self {
        self.expectations.push(expectation);
        self
    }
}

// =============================================================================
// TEST CASE
// =============================================================================

/// A scripted conversation with its own retry budget.
#[derive(Debug, Clone)]
pub struct TestCase {
    name: String,
    turns: Vec<Turn>,
    retry_budget: Option<u32>,
}

impl TestCase {
    /// Create a test case; fails with [`Error::EmptyTestCase`] without turns.
    pub fn new(name: impl Into<String>, turns: Vec<Turn>) -> Result<Self> {
        let name = name.into();
        bail_if!(turns.is_empty(), Error::empty_test_case(name));
        Ok(Self {
            name,
            turns,
            retry_budget: None,
        })
    }

    /// Retries allowed per turn, overriding the run default.
    pub fn with_retry_budget(mut self, retries: u32) -> Self {
        self.retry_budget = Some(retries);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn retry_budget(&self) -> Option<u32> {
        self.retry_budget
    }

    /// Effective retry budget given the run default.
    pub fn retries_or(&self, default: u32) -> u32 {
        self.retry_budget.unwrap_or(default)
    }

    /// Whether any turn holds a vector expectation.
    pub fn needs_scorer(&self) -> bool {
        self.turns
            .iter()
            .flat_map(|t| t.expectations.iter())
            .any(Expectation::needs_scorer)
    }

    pub fn expectation_count(&self) -> usize {
        self.turns.iter().map(|t| t.expectations.len()).sum()
    }
}

/// Check a set of test cases before a run.
pub fn validate_test_cases(test_cases: &[TestCase]) -> Result<()> {
    bail_if!(test_cases.is_empty(), Error::NoTestCases);
    for case in test_cases {
        bail_if!(case.turns.is_empty(), Error::empty_test_case(case.name.clone()));
    }
    Ok(())
}

// =============================================================================
// SUITE FILES
// =============================================================================

/// Serialized test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestCaseSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub turns: Vec<TurnSpec>,
}

/// Serialized turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TurnSpec {
    pub input: String,
    #[serde(default)]
    pub expectations: Vec<ExpectationSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SuiteFile {
    #[serde(default)]
    seed_prompts: Vec<String>,
    #[serde(default)]
    test_cases: Vec<TestCaseSpec>,
}

impl TestCaseSpec {
    /// Compile into a [`TestCase`]. `index` names unnamed cases.
    pub fn compile(&self, index: usize) -> Result<TestCase> {
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| format!("case-{}", index + 1));
        let turns = self
            .turns
            .iter()
            .map(|t| {
                Ok(Turn {
                    input: t.input.clone(),
                    expectations: t
                        .expectations
                        .iter()
                        .map(ExpectationSpec::compile)
                        .collect::<Result<Vec<_>>>()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let case = TestCase::new(name, turns)?;
        Ok(match self.retries {
            Some(r) => case.with_retry_budget(r),
            None => case,
        })
    }
}

/// Seed prompts plus compiled test cases.
#[derive(Debug, Clone)]
pub struct TestSuite {
    pub seed_prompts: Vec<String>,
    pub test_cases: Vec<TestCase>,
}

impl TestSuite {
    /// Parse and compile a suite from YAML text.
    ///
    /// `origin` is used in error messages.
    pub fn from_yaml_str(yaml: &str, origin: &str) -> Result<Self> {
        let file: SuiteFile =
            serde_yaml::from_str(yaml).map_err(|e| Error::invalid_suite(origin, e.to_string()))?;

        bail_if!(file.seed_prompts.is_empty(), Error::NoSeedPrompts);
        bail_if!(file.test_cases.is_empty(), Error::NoTestCases);

        let test_cases = file
            .test_cases
            .iter()
            .enumerate()
            .map(|(i, spec)| spec.compile(i))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            seed_prompts: file.seed_prompts,
            test_cases,
        })
    }

    /// Load a suite file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        let content =
            std::fs::read_to_string(path).map_err(|e| Error::file_read_error(display.clone(), e))?;
        Self::from_yaml_str(&content, &display)
    }

    /// Whether any test case holds a vector expectation.
    pub fn needs_scorer(&self) -> bool {
        self.test_cases.iter().any(TestCase::needs_scorer)
    }

    pub fn summary(&self) -> String {
        let turns: usize = self.test_cases.iter().map(|c| c.turns().len()).sum();
        let expectations: usize = self.test_cases.iter().map(|c| c.expectation_count()).sum();
        format!(
            "{} seed prompt(s), {} test case(s), {} turn(s), {} expectation(s)",
            self.seed_prompts.len(),
            self.test_cases.len(),
            turns,
            expectations
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SUITE: &str = r#"
seed_prompts:
  - prompt A
  - prompt B
test_cases:
  - name: greeting
    retries: 2
    turns:
      - input: Say hi
        expectations:
          - kind: contains
            pattern: hello
          - kind: vector
            target: Hi there
      - input: And again
  - turns:
      - input: Ping
        expectations:
          - kind: contains
            pattern: pong
            critical: false
"#;

    #[test]
    fn test_empty_test_case_rejected() {
        let err = TestCase::new("empty", vec![]).unwrap_err();
        assert!(matches!(err, Error::EmptyTestCase { ref name } if name == "empty"));
    }

    #[test]
    fn test_retry_budget_override() {
        let case = TestCase::new("t", vec![Turn::new("hi")]).unwrap();
        assert_eq!(case.retries_or(3), 3);
        let case = case.with_retry_budget(0);
        assert_eq!(case.retries_or(3), 0);
    }

    #[test]
    fn test_validate_test_cases() {
        assert!(matches!(validate_test_cases(&[]), Err(Error::NoTestCases)));
        let case = TestCase::new("t", vec![Turn::new("hi")]).unwrap();
        assert!(validate_test_cases(&[case]).is_ok());
    }

    #[test]
    fn test_parse_suite() {
        let suite = TestSuite::from_yaml_str(SUITE, "inline").unwrap();

        assert_eq!(suite.seed_prompts, vec!["prompt A", "prompt B"]);
        assert_eq!(suite.test_cases.len(), 2);

        let greeting = &suite.test_cases[0];
        assert_eq!(greeting.name(), "greeting");
        assert_eq!(greeting.retry_budget(), Some(2));
        assert_eq!(greeting.turns().len(), 2);
        assert_eq!(greeting.turns()[0].expectations.len(), 2);
        assert!(greeting.turns()[1].expectations.is_empty());
        assert!(greeting.needs_scorer());

        let unnamed = &suite.test_cases[1];
        assert_eq!(unnamed.name(), "case-2");
        assert_eq!(unnamed.retry_budget(), None);
        assert!(!unnamed.turns()[0].expectations[0].is_critical());
        assert!(!unnamed.needs_scorer());

        assert!(suite.needs_scorer());
        assert_eq!(
            suite.summary(),
            "2 seed prompt(s), 2 test case(s), 3 turn(s), 3 expectation(s)"
        );
    }

    #[test]
    fn test_bad_pattern_fails_at_load() {
        let yaml = r#"
seed_prompts: [p]
test_cases:
  - turns:
      - input: x
        expectations:
          - kind: contains
            pattern: "([a-z"
"#;
        let err = TestSuite::from_yaml_str(yaml, "inline").unwrap_err();
        assert_eq!(err.code(), "E010");
    }

    #[test]
    fn test_unknown_kind_fails_at_load() {
        let yaml = r#"
seed_prompts: [p]
test_cases:
  - turns:
      - input: x
        expectations:
          - kind: sentiment
            target: happy
"#;
        let err = TestSuite::from_yaml_str(yaml, "inline").unwrap_err();
        assert!(matches!(err, Error::InvalidSuite { .. }));
    }

    #[test]
    fn test_structural_errors() {
        let no_seeds = "test_cases:\n  - turns:\n      - input: x\n";
        assert!(matches!(
            TestSuite::from_yaml_str(no_seeds, "inline"),
            Err(Error::NoSeedPrompts)
        ));

        let no_cases = "seed_prompts: [p]\n";
        assert!(matches!(
            TestSuite::from_yaml_str(no_cases, "inline"),
            Err(Error::NoTestCases)
        ));

        let empty_case = "seed_prompts: [p]\ntest_cases:\n  - name: hollow\n";
        assert!(matches!(
            TestSuite::from_yaml_str(empty_case, "inline"),
            Err(Error::EmptyTestCase { .. })
        ));
    }
}
