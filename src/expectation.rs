//! Expectation evaluation.
//!
//! An [`Expectation`] is a scripted assertion about one actor reply. Two
//! kinds exist:
//!
//! - **Contains**: a regular expression, compiled when the expectation is
//!   built, that must match somewhere in the reply
//! - **Vector**: a target text whose semantic similarity to the reply must
//!   reach a threshold
//!
//! Every evaluation yields an [`ExpectationOutcome`] with a boolean verdict
//! and a score in `[0, 1]`.
//!
//! Vector expectations need a [`SimilarityScorer`]. [`EmbeddingSimilarity`]
//! is the production scorer: it embeds both texts through an
//! [`EmbeddingClient`] and compares the vectors with a [`SimilarityMetric`].
//!
//! # Example
//!
//! ```rust,ignore
//! use actor_optimizer::expectation::{Expectation, ExpectationEvaluator};
//!
//! let evaluator = ExpectationEvaluator::new(None, 0.8);
//! let outcome = evaluator
//!     .score(&Expectation::contains("hello")?, "hello world")
//!     .await?;
//! assert!(outcome.matched);
//! ```

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lru::LruCache;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm::EmbeddingClient;
use crate::{Error, Result};

// =============================================================================
// EXPECTATION
// =============================================================================

/// A compiled assertion about an actor reply.
#[derive(Debug, Clone)]
pub enum Expectation {
    /// Regex match; scores 1.0 when the pattern matches, else 0.0.
    Contains { pattern: Regex, critical: bool },
    /// Semantic similarity to `target`; matched at or above the threshold.
    Vector { target: String, critical: bool },
}

impl Expectation {
    /// A critical contains expectation.
    ///
    /// Fails with [`Error::InvalidPattern`] if `pattern` does not compile.
    pub fn contains(pattern: &str) -> Result<Self> {
        let compiled =
            Regex::new(pattern).map_err(|e| Error::invalid_pattern(pattern, e.to_string()))?;
        Ok(Self::Contains {
            pattern: compiled,
            critical: true,
        })
    }

    /// A non-critical vector expectation.
    pub fn vector(target: impl Into<String>) -> Self {
        Self::Vector {
            target: target.into(),
            critical: false,
        }
    }

    /// Override the criticality flag.
    pub fn with_critical(self, critical: bool) -> Self {
        match self {
            Self::Contains { pattern, .. } => Self::Contains { pattern, critical },
            Self::Vector { target, .. } => Self::Vector { target, critical },
        }
    }

    pub fn is_critical(&self) -> bool {
        match self {
            Self::Contains { critical, .. } | Self::Vector { critical, .. } => *critical,
        }
    }

    /// Whether scoring this expectation needs a similarity backend.
    pub fn needs_scorer(&self) -> bool {
        matches!(self, Self::Vector { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Contains { .. } => "contains",
            Self::Vector { .. } => "vector",
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = if self.is_critical() { "!" } else { "" };
        match self {
            Self::Contains { pattern, .. } => write!(f, "contains{}(/{}/)", flag, pattern.as_str()),
            Self::Vector { target, .. } => write!(f, "vector{}({:?})", flag, target),
        }
    }
}

/// Serialized form of an expectation, as written in suite files.
///
/// ```yaml
/// - kind: contains
///   pattern: "(?i)hello"
/// - kind: vector
///   target: "Hi there"
///   critical: true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", deny_unknown_fields)]
pub enum ExpectationSpec {
    Contains {
        pattern: String,
        #[serde(default = "default_true")]
        critical: bool,
    },
    Vector {
        target: String,
        #[serde(default)]
        critical: bool,
    },
}

fn default_true() -> bool {
    true
}

impl ExpectationSpec {
    /// Compile into an [`Expectation`]; invalid regexes fail here.
    pub fn compile(&self) -> Result<Expectation> {
        match self {
            Self::Contains { pattern, critical } => {
                Ok(Expectation::contains(pattern)?.with_critical(*critical))
            }
            Self::Vector { target, critical } => {
                Ok(Expectation::vector(target.clone()).with_critical(*critical))
            }
        }
    }
}

/// Verdict and score of one expectation against one reply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpectationOutcome {
    pub matched: bool,
    pub score: f64,
    pub critical: bool,
}

// =============================================================================
// SIMILARITY
// =============================================================================

/// Semantic similarity between two texts, in `[0, 1]`.
#[async_trait]
pub trait SimilarityScorer: Send + Sync {
    async fn similarity(&self, a: &str, b: &str) -> Result<f64>;
}

/// How two embedding vectors are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    /// Cosine similarity, negative values clamped to 0.
    #[default]
    Cosine,
    /// `1 / (1 + L2 distance)`.
    Euclidean,
    /// `1 / (1 + L1 distance)`.
    Manhattan,
}

impl SimilarityMetric {
    /// Compare two vectors. `None` when they are empty or differ in length.
    pub fn compare(&self, a: &[f32], b: &[f32]) -> Option<f64> {
        if a.is_empty() || a.len() != b.len() {
            return None;
        }
        match self {
            Self::Cosine => {
                let mut dot = 0.0f64;
                let mut na = 0.0f64;
                let mut nb = 0.0f64;
                for (x, y) in a.iter().zip(b.iter()) {
                    let (x, y) = (*x as f64, *y as f64);
                    dot += x * y;
                    na += x * x;
                    nb += y * y;
                }
                if na <= f64::EPSILON || nb <= f64::EPSILON {
                    return None;
                }
                Some((dot / (na.sqrt() * nb.sqrt())).clamp(0.0, 1.0))
            }
            Self::Euclidean => {
                let d: f64 = a
                    .iter()
                    .zip(b.iter())
                    .map(|(x, y)| (*x as f64 - *y as f64).powi(2))
                    .sum::<f64>()
                    .sqrt();
                Some(1.0 / (1.0 + d))
            }
            Self::Manhattan => {
                let d: f64 = a
                    .iter()
                    .zip(b.iter())
                    .map(|(x, y)| (*x as f64 - *y as f64).abs())
                    .sum();
                Some(1.0 / (1.0 + d))
            }
        }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cosine => write!(f, "cosine"),
            Self::Euclidean => write!(f, "euclidean"),
            Self::Manhattan => write!(f, "manhattan"),
        }
    }
}

impl std::str::FromStr for SimilarityMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "euclidean" => Ok(Self::Euclidean),
            "manhattan" => Ok(Self::Manhattan),
            other => Err(Error::config_invalid_value(
                "similarity_metric",
                format!("unknown metric '{}'", other),
            )),
        }
    }
}

const DEFAULT_EMBEDDING_CACHE: usize = 512;

/// Similarity over embeddings with an LRU cache of vectors.
///
/// Targets repeat across every candidate and generation, so each distinct
/// text is embedded once while it stays in the cache.
pub struct EmbeddingSimilarity {
    client: Arc<dyn EmbeddingClient>,
    metric: SimilarityMetric,
    cache: Mutex<LruCache<String, Arc<Vec<f32>>>>,
}

impl EmbeddingSimilarity {
    pub fn new(client: Arc<dyn EmbeddingClient>, metric: SimilarityMetric) -> Self {
        Self::with_capacity(client, metric, DEFAULT_EMBEDDING_CACHE)
    }

    pub fn with_capacity(
        client: Arc<dyn EmbeddingClient>,
        metric: SimilarityMetric,
        capacity: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            client,
            metric,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    /// Number of cached embeddings.
    pub fn cached(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    async fn embedding(&self, text: &str) -> Result<Arc<Vec<f32>>> {
        // The lock is never held across the embed call.
        let cached = {
            let mut cache = self
                .cache
                .lock()
                .map_err(|_| Error::internal("embedding cache poisoned"))?;
            cache.get(text).cloned()
        };
        if let Some(hit) = cached {
            return Ok(hit);
        }

        let vector = Arc::new(
            self.client
                .embed(text)
                .await
                .map_err(|e| Error::scoring_unavailable(format!("embedding failed: {}", e)))?,
        );
        self.cache
            .lock()
            .map_err(|_| Error::internal("embedding cache poisoned"))?
            .put(text.to_string(), Arc::clone(&vector));
        Ok(vector)
    }
}

#[async_trait]
impl SimilarityScorer for EmbeddingSimilarity {
    async fn similarity(&self, a: &str, b: &str) -> Result<f64> {
        let (va, vb) = futures::try_join!(self.embedding(a), self.embedding(b))?;
        self.metric.compare(&va, &vb).ok_or_else(|| {
            Error::scoring_unavailable(format!(
                "cannot compare embeddings of length {} and {}",
                va.len(),
                vb.len()
            ))
        })
    }
}

// =============================================================================
// EVALUATOR
// =============================================================================

/// Scores expectations against replies.
#[derive(Clone)]
pub struct ExpectationEvaluator {
    scorer: Option<Arc<dyn SimilarityScorer>>,
    threshold: f64,
}

impl ExpectationEvaluator {
    pub fn new(scorer: Option<Arc<dyn SimilarityScorer>>, threshold: f64) -> Self {
        Self { scorer, threshold }
    }

    pub fn has_scorer(&self) -> bool {
        self.scorer.is_some()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Score one expectation against `produced`.
    ///
    /// Vector expectations fail with [`Error::ScoringUnavailable`] when no
    /// scorer is configured or the scorer errors; they are never scored 0.
    pub async fn score(
        &self,
        expectation: &Expectation,
        produced: &str,
    ) -> Result<ExpectationOutcome> {
        match expectation {
            Expectation::Contains { pattern, critical } => {
                let matched = pattern.is_match(produced);
                Ok(ExpectationOutcome {
                    matched,
                    score: if matched { 1.0 } else { 0.0 },
                    critical: *critical,
                })
            }
            Expectation::Vector { target, critical } => {
                let scorer = self.scorer.as_ref().ok_or_else(|| {
                    Error::scoring_unavailable("vector expectation without a similarity scorer")
                })?;
                let score = scorer
                    .similarity(produced, target)
                    .await
                    .map_err(|e| match e {
                        Error::ScoringUnavailable(_) => e,
                        other => Error::scoring_unavailable(other.to_string()),
                    })?;
                let score = if score.is_finite() {
                    score.clamp(0.0, 1.0)
                } else {
                    return Err(Error::scoring_unavailable(format!(
                        "similarity returned {}",
                        score
                    )));
                };
                debug!(target = %target, score, "vector expectation scored");
                Ok(ExpectationOutcome {
                    matched: score >= self.threshold,
                    score,
                    critical: *critical,
                })
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
