//! Configuration for the optimization engine.
//!
//! [`OptimizerConfig`] holds every knob of a run: population sizing, the
//! generation budget, retry and timeout budgets, concurrency limits, the turn
//! scoring policy and the settings of the LLM-backed genetic operator.
//! Configuration can be loaded from a YAML file or built from defaults.
//!
//! # Example Configuration File
//!
//! ```yaml
//! generations: 5
//! population_size: 8
//! survivor_count: 3
//! max_retries: 2
//! concurrency_limit: 4
//! actor_timeout_ms: 30000
//! similarity_threshold: 0.75
//! shortfall_policy: tolerate
//! seed: 42
//! convergence:
//!   epsilon: 0.01
//!   window: 2
//! scoring:
//!   gate_on_critical: true
//!   critical_failure_score: 0.0
//! genetic:
//!   mutation_rate: 0.5
//!   directives:
//!     Rephrase: 1.0
//!     Summarize: 2.0
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use actor_optimizer::OptimizerConfig;
//!
//! let config = OptimizerConfig::load_from_file(Path::new("./optimizer.yaml"))?;
//! let config = OptimizerConfig::fast().with_generations(2).with_seed(7);
//! ```

// Standard library
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

// External crates
use serde::{Deserialize, Serialize};
use tracing::warn;

// Internal modules
use crate::error::{bail_if, Error, Result};

// =============================================================================
// SCORING POLICY
// =============================================================================

/// How expectation scores combine into a turn score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    /// A failed critical expectation overrides the mean.
    #[serde(default = "default_true")]
    pub gate_on_critical: bool,

    /// Turn score used when a critical expectation fails.
    #[serde(default)]
    pub critical_failure_score: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            gate_on_critical: true,
            critical_failure_score: 0.0,
        }
    }
}

// =============================================================================
// CONVERGENCE
// =============================================================================

/// Early stop when the best-ever score stagnates.
///
/// The run stops once the best-ever score has improved by no more than
/// `epsilon` over the last `window` generations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceConfig {
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,

    #[serde(default = "default_window")]
    pub window: usize,
}

fn default_epsilon() -> f64 {
    1e-3
}

fn default_window() -> usize {
    3
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            epsilon: default_epsilon(),
            window: default_window(),
        }
    }
}

// =============================================================================
// SHORTFALL POLICY
// =============================================================================

/// What the regenerator does when a child slot cannot be filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShortfallPolicy {
    /// Stop the run with a fatal error.
    #[default]
    Abort,
    /// Continue with a smaller population and record the shortfall.
    Tolerate,
}

impl fmt::Display for ShortfallPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort => write!(f, "abort"),
            Self::Tolerate => write!(f, "tolerate"),
        }
    }
}

impl FromStr for ShortfallPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "tolerate" => Ok(Self::Tolerate),
            other => Err(Error::config_invalid_value(
                "shortfall_policy",
                format!("unknown policy '{}', expected abort or tolerate", other),
            )),
        }
    }
}

// =============================================================================
// GENETIC OPERATOR CONFIG
// =============================================================================

/// Settings of the LLM-backed genetic operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneticConfig {
    /// Probability that a recombined child is mutated once more.
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f64,

    /// Temperature of the first attempt; later attempts run hotter.
    #[serde(default = "default_base_temperature")]
    pub base_temperature: f64,

    #[serde(default = "default_mutate_attempts")]
    pub mutate_attempts: u32,

    #[serde(default = "default_recombine_attempts")]
    pub recombine_attempts: u32,

    /// Mutation directives and their draw weights.
    #[serde(default = "default_directives")]
    pub directives: BTreeMap<String, f64>,
}

fn default_mutation_rate() -> f64 {
    0.5
}

fn default_base_temperature() -> f64 {
    0.3
}

fn default_mutate_attempts() -> u32 {
    11
}

fn default_recombine_attempts() -> u32 {
    4
}

fn default_directives() -> BTreeMap<String, f64> {
    [
        "Rephrase",
        "Randomize",
        "Summarize",
        "Expand",
        "Reorder",
        "Remove Duplicate",
    ]
    .into_iter()
    .map(|d| (d.to_string(), 1.0))
    .collect()
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self {
            mutation_rate: default_mutation_rate(),
            base_temperature: default_base_temperature(),
            mutate_attempts: default_mutate_attempts(),
            recombine_attempts: default_recombine_attempts(),
            directives: default_directives(),
        }
    }
}

impl GeneticConfig {
    /// Temperature for a zero-based attempt: `base^(1/(attempt+1))`.
    pub fn temperature_for_attempt(&self, attempt: u32) -> f64 {
        self.base_temperature.powf(1.0 / (attempt as f64 + 1.0))
    }

    fn validate(&self) -> Result<()> {
        bail_if!(
            !(0.0..=1.0).contains(&self.mutation_rate),
            Error::config_invalid_value("genetic.mutation_rate", "must be within [0, 1]")
        );
        bail_if!(
            self.base_temperature <= 0.0,
            Error::config_invalid_value("genetic.base_temperature", "must be > 0")
        );
        bail_if!(
            self.mutate_attempts == 0,
            Error::config_invalid_value("genetic.mutate_attempts", "must be >= 1")
        );
        bail_if!(
            self.recombine_attempts == 0,
            Error::config_invalid_value("genetic.recombine_attempts", "must be >= 1")
        );
        bail_if!(
            self.directives.is_empty(),
            Error::config_invalid_value("genetic.directives", "at least one directive is required")
        );
        if let Some((name, _)) = self
            .directives
            .iter()
            .find(|(_, w)| !w.is_finite() || **w <= 0.0)
        {
            return Err(Error::config_invalid_value(
                "genetic.directives",
                format!("weight of '{}' must be a positive number", name),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// OPTIMIZER CONFIG
// =============================================================================

/// Configuration of one optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Target population size. Derived from the seed count when unset.
    #[serde(default)]
    pub population_size: Option<usize>,

    /// Number of regenerations; `generations + 1` populations are evaluated.
    #[serde(default = "default_generations")]
    pub generations: usize,

    /// Survivors kept per generation. Derived from the seed count when unset.
    #[serde(default)]
    pub survivor_count: Option<usize>,

    /// Retry budget for test cases that do not set their own.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Global cap on simultaneous actor calls.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Candidate-level worker pool size. Defaults to the population size.
    #[serde(default)]
    pub workers: Option<usize>,

    #[serde(default = "default_actor_timeout_ms")]
    pub actor_timeout_ms: u64,

    #[serde(default = "default_operator_timeout_ms")]
    pub operator_timeout_ms: u64,

    /// Extra attempts per child slot during regeneration.
    #[serde(default = "default_operator_retries")]
    pub operator_retries: u32,

    /// Minimum similarity for a vector expectation to count as matched.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    #[serde(default)]
    pub scoring: ScoringPolicy,

    #[serde(default)]
    pub convergence: Option<ConvergenceConfig>,

    #[serde(default)]
    pub shortfall_policy: ShortfallPolicy,

    /// Regenerate the seeds up to the population size before generation 0.
    #[serde(default)]
    pub fill_initial_population: bool,

    /// Wall-clock budget for the whole run.
    #[serde(default)]
    pub deadline_secs: Option<u64>,

    /// Seed for reproducible parent pairing.
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    pub genetic: GeneticConfig,
}

fn default_generations() -> usize {
    3
}

fn default_max_retries() -> u32 {
    3
}

fn default_concurrency_limit() -> usize {
    8
}

fn default_actor_timeout_ms() -> u64 {
    60_000
}

fn default_operator_timeout_ms() -> u64 {
    120_000
}

fn default_operator_retries() -> u32 {
    3
}

fn default_similarity_threshold() -> f64 {
    0.8
}

fn default_true() -> bool {
    true
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            population_size: None,
            generations: default_generations(),
            survivor_count: None,
            max_retries: default_max_retries(),
            concurrency_limit: default_concurrency_limit(),
            workers: None,
            actor_timeout_ms: default_actor_timeout_ms(),
            operator_timeout_ms: default_operator_timeout_ms(),
            operator_retries: default_operator_retries(),
            similarity_threshold: default_similarity_threshold(),
            scoring: ScoringPolicy::default(),
            convergence: None,
            shortfall_policy: ShortfallPolicy::default(),
            fill_initial_population: false,
            deadline_secs: None,
            seed: None,
            genetic: GeneticConfig::default(),
        }
    }
}

impl OptimizerConfig {
    /// A short run: two generations, small pools, tolerant regeneration.
    pub fn fast() -> Self {
        Self {
            generations: 2,
            max_retries: 1,
            operator_retries: 1,
            shortfall_policy: ShortfallPolicy::Tolerate,
            ..Self::default()
        }
    }

    /// A longer run that stops early once the best score stagnates.
    pub fn thorough() -> Self {
        Self {
            generations: 10,
            max_retries: 5,
            operator_retries: 5,
            convergence: Some(ConvergenceConfig::default()),
            ..Self::default()
        }
    }

    /// Set the number of generations.
    pub fn with_generations(mut self, generations: usize) -> Self {
        self.generations = generations;
        self
    }

    /// Set the target population size.
    pub fn with_population_size(mut self, size: usize) -> Self {
        self.population_size = Some(size);
        self
    }

    /// Set the number of survivors per generation.
    pub fn with_survivor_count(mut self, count: usize) -> Self {
        self.survivor_count = Some(count);
        self
    }

    /// Set the default retry budget.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the global actor call limit.
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    /// Set the candidate worker pool size.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Set the per-call actor timeout.
    pub fn with_actor_timeout(mut self, timeout: Duration) -> Self {
        self.actor_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the per-call genetic operator timeout.
    pub fn with_operator_timeout(mut self, timeout: Duration) -> Self {
        self.operator_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the extra attempts per child slot.
    pub fn with_operator_retries(mut self, retries: u32) -> Self {
        self.operator_retries = retries;
        self
    }

    /// Set the vector expectation threshold.
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Set the turn scoring policy.
    pub fn with_scoring(mut self, scoring: ScoringPolicy) -> Self {
        self.scoring = scoring;
        self
    }

    /// Enable early stop on stagnation.
    pub fn with_convergence(mut self, epsilon: f64, window: usize) -> Self {
        self.convergence = Some(ConvergenceConfig { epsilon, window });
        self
    }

    /// Set the regeneration shortfall policy.
    pub fn with_shortfall_policy(mut self, policy: ShortfallPolicy) -> Self {
        self.shortfall_policy = policy;
        self
    }

    /// Fill the initial population up to size before generation 0.
    pub fn with_fill_initial_population(mut self, fill: bool) -> Self {
        self.fill_initial_population = fill;
        self
    }

    /// Set a wall-clock deadline for the run.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_secs = Some(deadline.as_secs());
        self
    }

    /// Set a seed for deterministic behavior.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the genetic operator settings.
    pub fn with_genetic(mut self, genetic: GeneticConfig) -> Self {
        self.genetic = genetic;
        self
    }

    // -------------------------------------------------------------------------
    // Derived values
    // -------------------------------------------------------------------------

    /// Survivors per generation for `seed_count` distinct seeds.
    ///
    /// Defaults to `max(ceil(log2(seeds + 1)), 3)`. A derived count leaves
    /// room for at least one child; an explicit one is only capped at the
    /// population size.
    pub fn survivor_count_for(&self, seed_count: usize) -> usize {
        let population = self.population_size_for(seed_count);
        match self.survivor_count {
            Some(explicit) => explicit.min(population),
            None => {
                let room = if population > 1 { population - 1 } else { population };
                derived_survivors(seed_count).min(room)
            }
        }
    }

    /// Target population size for `seed_count` distinct seeds.
    ///
    /// Defaults to `max(max(survivors, 5), seeds)`, and always one more than
    /// the survivor count.
    pub fn population_size_for(&self, seed_count: usize) -> usize {
        self.population_size.unwrap_or_else(|| {
            let survivors = self
                .survivor_count
                .unwrap_or_else(|| derived_survivors(seed_count));
            survivors.max(5).max(seed_count).max(survivors + 1)
        })
    }

    /// Candidate worker pool size for a population, capped by the global limit.
    pub fn workers_for(&self, population_size: usize) -> usize {
        self.workers
            .unwrap_or(population_size)
            .min(self.concurrency_limit)
            .max(1)
    }

    /// Per-call actor timeout.
    pub fn actor_timeout(&self) -> Duration {
        Duration::from_millis(self.actor_timeout_ms)
    }

    /// Per-call genetic operator timeout.
    pub fn operator_timeout(&self) -> Duration {
        Duration::from_millis(self.operator_timeout_ms)
    }

    /// Optional wall-clock deadline.
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    // -------------------------------------------------------------------------
    // Validation and persistence
    // -------------------------------------------------------------------------

    /// Check value ranges and cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        bail_if!(
            self.population_size == Some(0),
            Error::config_invalid_value("population_size", "must be > 0")
        );
        bail_if!(
            self.survivor_count == Some(0),
            Error::config_invalid_value("survivor_count", "must be > 0")
        );
        if let (Some(population), Some(survivors)) = (self.population_size, self.survivor_count) {
            bail_if!(
                survivors > population,
                Error::config_invalid_value(
                    "survivor_count",
                    format!(
                        "{} survivors cannot fit in a population of {}",
                        survivors, population
                    ),
                )
            );
        }
        if self.population_size.is_some() && self.population_size == self.survivor_count {
            warn!(
                population_size = ?self.population_size,
                "survivor_count equals population_size; regeneration will add no children"
            );
        }
        bail_if!(
            self.concurrency_limit == 0,
            Error::config_invalid_value("concurrency_limit", "must be > 0")
        );
        bail_if!(
            self.workers == Some(0),
            Error::config_invalid_value("workers", "must be > 0")
        );
        bail_if!(
            self.actor_timeout_ms == 0,
            Error::config_invalid_value("actor_timeout_ms", "must be > 0")
        );
        bail_if!(
            self.operator_timeout_ms == 0,
            Error::config_invalid_value("operator_timeout_ms", "must be > 0")
        );
        bail_if!(
            !(0.0..=1.0).contains(&self.similarity_threshold),
            Error::config_invalid_value("similarity_threshold", "must be within [0, 1]")
        );
        bail_if!(
            !(0.0..=1.0).contains(&self.scoring.critical_failure_score),
            Error::config_invalid_value("scoring.critical_failure_score", "must be within [0, 1]")
        );
        if let Some(convergence) = &self.convergence {
            bail_if!(
                convergence.epsilon < 0.0,
                Error::config_invalid_value("convergence.epsilon", "must be >= 0")
            );
            bail_if!(
                convergence.window == 0,
                Error::config_invalid_value("convergence.window", "must be >= 1")
            );
        }
        bail_if!(
            self.deadline_secs == Some(0),
            Error::config_invalid_value("deadline_secs", "must be > 0")
        );
        self.genetic.validate()
    }

    /// Loads and validates configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file does not exist or cannot be read
    /// - The file contains invalid YAML or unknown structure
    /// - A value is out of range
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ConfigFileNotFound {
                    path: display.clone(),
                    source: Some(e),
                }
            } else {
                Error::file_read_error(display.clone(), e)
            }
        })?;
        let config: OptimizerConfig = serde_yaml::from_str(&content)
            .map_err(|e| Error::config_invalid_format(display, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)
            .map_err(|e| Error::file_write_error(path.display().to_string(), e))?;
        Ok(())
    }

    /// One-line description for logs.
    pub fn summary(&self) -> String {
        format!(
            "generations={} population={} survivors={} retries={} concurrency={} shortfall={}",
            self.generations,
            self.population_size
                .map(|n| n.to_string())
                .unwrap_or_else(|| "auto".to_string()),
            self.survivor_count
                .map(|n| n.to_string())
                .unwrap_or_else(|| "auto".to_string()),
            self.max_retries,
            self.concurrency_limit,
            self.shortfall_policy,
        )
    }
}

// =============================================================================
// UNIT TESTS
// =============================================================================

fn derived_survivors(seed_count: usize) -> usize {
    (((seed_count + 1) as f64).log2().ceil() as usize).max(3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = OptimizerConfig::default();

        assert_eq!(config.generations, 3);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.concurrency_limit, 8);
        assert_eq!(config.actor_timeout_ms, 60_000);
        assert_eq!(config.operator_timeout_ms, 120_000);
        assert_eq!(config.similarity_threshold, 0.8);
        assert_eq!(config.shortfall_policy, ShortfallPolicy::Abort);
        assert!(config.scoring.gate_on_critical);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(OptimizerConfig::fast().validate().is_ok());
        assert!(OptimizerConfig::thorough().validate().is_ok());
        assert!(OptimizerConfig::thorough().convergence.is_some());
    }

    #[test]
    fn test_derived_sizes() {
        let config = OptimizerConfig::default();

        // 2 seeds: ceil(log2(3)) = 2 -> 3 survivors; population max(3, 5, 2) = 5
        assert_eq!(config.survivor_count_for(2), 3);
        assert_eq!(config.population_size_for(2), 5);

        // 20 seeds: ceil(log2(21)) = 5 survivors; population 20
        assert_eq!(config.survivor_count_for(20), 5);
        assert_eq!(config.population_size_for(20), 20);
    }

    #[test]
    fn test_derived_survivors_leave_room_for_children() {
        let config = OptimizerConfig::default().with_population_size(3);
        assert_eq!(config.survivor_count_for(2), 2);

        let config = OptimizerConfig::default().with_population_size(2);
        assert_eq!(config.survivor_count_for(2), 1);

        let config = OptimizerConfig::default().with_population_size(1);
        assert_eq!(config.survivor_count_for(2), 1);
    }

    #[test]
    fn test_derived_population_exceeds_explicit_survivors() {
        let config = OptimizerConfig::default().with_survivor_count(6);
        assert_eq!(config.population_size_for(2), 7);
        assert_eq!(config.survivor_count_for(2), 6);

        let config = OptimizerConfig::default().with_survivor_count(2);
        assert_eq!(config.population_size_for(2), 5);
    }

    #[test]
    fn test_explicit_equal_sizes_still_validate() {
        let config = OptimizerConfig::default()
            .with_population_size(4)
            .with_survivor_count(4);
        assert!(config.validate().is_ok());
        assert_eq!(config.survivor_count_for(2), 4);
    }

    #[test]
    fn test_explicit_sizes_win() {
        let config = OptimizerConfig::default()
            .with_population_size(4)
            .with_survivor_count(1);
        assert_eq!(config.population_size_for(10), 4);
        assert_eq!(config.survivor_count_for(10), 1);
    }

    #[test]
    fn test_workers_capped_by_concurrency_limit() {
        let config = OptimizerConfig::default().with_concurrency_limit(3);
        assert_eq!(config.workers_for(10), 3);
        assert_eq!(config.workers_for(2), 2);

        let config = config.with_workers(1);
        assert_eq!(config.workers_for(10), 1);
    }

    #[test]
    fn test_temperature_schedule() {
        let genetic = GeneticConfig::default();
        assert!((genetic.temperature_for_attempt(0) - 0.3).abs() < 1e-9);
        assert!((genetic.temperature_for_attempt(1) - 0.3f64.sqrt()).abs() < 1e-9);
        assert!(genetic.temperature_for_attempt(5) > genetic.temperature_for_attempt(1));
    }

    #[test]
    fn test_default_directives() {
        let genetic = GeneticConfig::default();
        assert_eq!(genetic.directives.len(), 6);
        assert_eq!(genetic.directives.get("Remove Duplicate"), Some(&1.0));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let err = OptimizerConfig::default()
            .with_population_size(2)
            .with_survivor_count(3)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::ConfigInvalidValue { ref key, .. } if key == "survivor_count"));

        assert!(OptimizerConfig::default()
            .with_concurrency_limit(0)
            .validate()
            .is_err());
        assert!(OptimizerConfig::default()
            .with_similarity_threshold(1.5)
            .validate()
            .is_err());
        assert!(OptimizerConfig::default()
            .with_convergence(0.01, 0)
            .validate()
            .is_err());

        let mut genetic = GeneticConfig::default();
        genetic.directives.insert("Broken".to_string(), 0.0);
        assert!(OptimizerConfig::default()
            .with_genetic(genetic)
            .validate()
            .is_err());
    }

    #[test]
    fn test_shortfall_policy_parse() {
        assert_eq!("abort".parse::<ShortfallPolicy>().unwrap(), ShortfallPolicy::Abort);
        assert_eq!(
            "Tolerate".parse::<ShortfallPolicy>().unwrap(),
            ShortfallPolicy::Tolerate
        );
        assert!("ignore".parse::<ShortfallPolicy>().is_err());
        assert_eq!(ShortfallPolicy::Tolerate.to_string(), "tolerate");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
generations: 7
shortfall_policy: tolerate
genetic:
  mutation_rate: 0.25
"#;

        let config: OptimizerConfig = serde_yaml::from_str(yaml).expect("Should deserialize");

        assert_eq!(config.generations, 7);
        assert_eq!(config.shortfall_policy, ShortfallPolicy::Tolerate);
        assert_eq!(config.genetic.mutation_rate, 0.25);
        // Other fields should use defaults
        assert_eq!(config.genetic.mutate_attempts, 11);
        assert_eq!(config.genetic.directives.len(), 6);
        assert_eq!(config.concurrency_limit, 8);
        assert!(config.population_size.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut temp_file = NamedTempFile::new().expect("Should create temp file");
        let yaml = r#"
population_size: 6
survivor_count: 2
convergence:
  epsilon: 0.05
"#;
        temp_file.write_all(yaml.as_bytes()).expect("Should write");

        let config = OptimizerConfig::load_from_file(temp_file.path()).expect("Should load");

        assert_eq!(config.population_size, Some(6));
        assert_eq!(config.survivor_count, Some(2));
        let convergence = config.convergence.expect("convergence set");
        assert_eq!(convergence.epsilon, 0.05);
        assert_eq!(convergence.window, 3);
    }

    #[test]
    fn test_load_missing_file() {
        let err = OptimizerConfig::load_from_file(Path::new("/definitely/not/here.yaml"))
            .unwrap_err();
        assert_eq!(err.code(), "E001");
    }

    #[test]
    fn test_load_invalid_value_is_rejected() {
        let mut temp_file = NamedTempFile::new().expect("Should create temp file");
        temp_file
            .write_all(b"similarity_threshold: 3.0\n")
            .expect("Should write");

        let err = OptimizerConfig::load_from_file(temp_file.path()).unwrap_err();
        assert_eq!(err.code(), "E004");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = tempfile::tempdir().expect("Should create temp dir");
        let config_path = temp_dir.path().join("nested").join("optimizer.yaml");

        let original = OptimizerConfig::thorough()
            .with_population_size(9)
            .with_seed(11)
            .with_shortfall_policy(ShortfallPolicy::Tolerate);

        original.save(&config_path).expect("Should save");
        let loaded = OptimizerConfig::load_from_file(&config_path).expect("Should load");

        assert_eq!(original, loaded);
    }
}
