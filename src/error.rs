//! Error types for the actor optimizer.
//!
//! This module provides the crate-wide error enum with:
//! - Error codes for programmatic handling (E001-E099)
//! - A transient/fatal split that drives the retry policy of the engine
//! - User-facing suggestions and CLI exit codes
//!
//! # Error Code Ranges
//!
//! | Range | Category |
//! |-------|----------|
//! | E001-E009 | Configuration errors |
//! | E010-E019 | Test suite errors |
//! | E020-E029 | Evaluation errors |
//! | E030-E039 | Selection / regeneration errors |
//! | E040-E049 | Transport errors |
//! | E070-E079 | I/O errors |
//! | E080-E089 | Serialization errors |
//! | E090-E099 | Internal errors |
//!
//! # Transient vs fatal
//!
//! Transient errors (actor failures, timeouts, retryable HTTP statuses) are
//! absorbed by the retry loops of the test case runner and the regenerator.
//! Fatal errors (scoring backend unavailable, no survivors, invalid
//! configuration) unwind to the optimizer, which stops the run and hands the
//! best-ever candidate back to the caller together with the error.
//!
//! ## Macros
//!
//! ```ignore
//! use actor_optimizer::error::{bail_if, Error};
//!
//! fn check(size: usize) -> Result<()> {
//!     bail_if!(size == 0, Error::config_invalid_value("population_size", "must be > 0"));
//!     Ok(())
//! }
//! ```

use thiserror::Error;

// =============================================================================
// CLI EXIT CODES
// =============================================================================

/// Exit code for successful execution.
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: i32 = 1;

/// Exit code for test suite errors (bad patterns, empty test cases).
pub const EXIT_SUITE_ERROR: i32 = 2;

/// Exit code for evaluation errors (scoring backend, cancellation).
pub const EXIT_EVALUATION_ERROR: i32 = 3;

/// Exit code for transport errors.
pub const EXIT_API_ERROR: i32 = 4;

/// Exit code for selection and regeneration errors.
pub const EXIT_SELECTION_ERROR: i32 = 5;

/// Exit code for I/O errors.
pub const EXIT_IO_ERROR: i32 = 10;

/// Exit code for internal errors.
pub const EXIT_INTERNAL_ERROR: i32 = 99;

// =============================================================================
// BAIL_IF MACRO
// =============================================================================

/// Early return if condition is true.
///
/// ```ignore
/// bail_if!(turns.is_empty(), Error::empty_test_case(name));
/// ```
#[macro_export]
macro_rules! bail_if {
    ($cond:expr, $err:expr) => {
        if $cond {
            return Err($err);
        }
    };
}

pub use bail_if;

// =============================================================================
// ERROR TYPE
// =============================================================================

/// The main error type for the actor optimizer.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // CONFIGURATION ERRORS (E001-E009)
    // =========================================================================
    /// Configuration file not found.
    #[error("[E001] Configuration file not found: {path}")]
    ConfigFileNotFound {
        path: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration file has invalid format.
    #[error("[E002] Invalid configuration format in {path}: {details}")]
    ConfigInvalidFormat { path: String, details: String },

    /// Required configuration value is missing.
    #[error("[E003] Missing required configuration: {key}")]
    ConfigMissingKey { key: String },

    /// Configuration value is invalid.
    #[error("[E004] Invalid configuration value for '{key}': {details}")]
    ConfigInvalidValue { key: String, details: String },

    /// General configuration error.
    #[error("[E005] Configuration error: {0}")]
    Config(String),

    // =========================================================================
    // TEST SUITE ERRORS (E010-E019)
    // =========================================================================
    /// A contains expectation carries a pattern that does not compile.
    #[error("[E010] Invalid expectation pattern '{pattern}': {details}")]
    InvalidPattern { pattern: String, details: String },

    /// A test case has no turns.
    #[error("[E011] Test case '{name}' has no turns")]
    EmptyTestCase { name: String },

    /// No test cases were supplied.
    #[error("[E012] At least one test case is required")]
    NoTestCases,

    /// No seed prompts were supplied.
    #[error("[E013] At least one seed prompt is required")]
    NoSeedPrompts,

    /// Suite file could not be parsed.
    #[error("[E014] Invalid test suite {path}: {details}")]
    InvalidSuite { path: String, details: String },

    // =========================================================================
    // EVALUATION ERRORS (E020-E029)
    // =========================================================================
    /// The actor failed to answer a turn.
    #[error("[E020] Actor failed: {0}")]
    ActorFailed(String),

    /// The actor did not answer within its time budget.
    #[error("[E021] Actor timed out after {timeout_ms}ms")]
    ActorTimeout { timeout_ms: u64 },

    /// The similarity backend is missing or broken.
    #[error("[E022] Scoring backend unavailable: {0}")]
    ScoringUnavailable(String),

    /// The run was cancelled by the caller or by its deadline.
    #[error("[E023] Optimization cancelled")]
    Cancelled,

    // =========================================================================
    // SELECTION / REGENERATION ERRORS (E030-E039)
    // =========================================================================
    /// Selection produced no parents.
    #[error("[E030] No surviving candidates after selection in generation {generation}")]
    NoSurvivors { generation: usize },

    /// The genetic operator failed to produce a child.
    #[error("[E031] Genetic operator failed: {0}")]
    GeneticOperator(String),

    /// The genetic operator did not answer within its time budget.
    #[error("[E032] Genetic operator timed out after {timeout_ms}ms")]
    OperatorTimeout { timeout_ms: u64 },

    // =========================================================================
    // TRANSPORT ERRORS (E040-E049)
    // =========================================================================
    /// API request timed out.
    #[error("[E040] API request timed out after {timeout_secs}s")]
    ApiTimeout { timeout_secs: u64 },

    /// API returned an error response.
    #[error("[E041] API error ({status}): {message}")]
    ApiResponse { status: u16, message: String },

    /// API authentication failed.
    #[error("[E042] API authentication failed")]
    ApiAuthFailed,

    /// API rate limit exceeded.
    #[error("[E043] API rate limit exceeded")]
    ApiRateLimited { retry_after_secs: Option<u64> },

    /// HTTP client error.
    #[error("[E044] HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API answered with an empty or malformed body.
    #[error("[E045] Empty response from API: {0}")]
    ApiEmptyResponse(String),

    // =========================================================================
    // I/O ERRORS (E070-E079)
    // =========================================================================
    /// File read error.
    #[error("[E070] Failed to read file: {path}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// File write error.
    #[error("[E071] Failed to write file: {path}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// General I/O error.
    #[error("[E072] I/O error: {0}")]
    Io(#[from] std::io::Error),

    // =========================================================================
    // SERIALIZATION ERRORS (E080-E089)
    // =========================================================================
    /// JSON serialization/deserialization error.
    #[error("[E080] JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error.
    #[error("[E081] YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // =========================================================================
    // INTERNAL ERRORS (E090-E099)
    // =========================================================================
    /// An unexpected internal error occurred.
    #[error("[E090] Internal error: {message}")]
    Internal { message: String },
}

// =============================================================================
// CONSTRUCTOR METHODS
// =============================================================================

impl Error {
    /// Create a config file not found error.
    pub fn config_file_not_found(path: impl Into<String>) -> Self {
        Self::ConfigFileNotFound {
            path: path.into(),
            source: None,
        }
    }

    /// Create an invalid config format error.
    pub fn config_invalid_format(path: impl Into<String>, details: impl Into<String>) -> Self {
        Self::ConfigInvalidFormat {
            path: path.into(),
            details: details.into(),
        }
    }

    /// Create an invalid config value error.
    pub fn config_invalid_value(key: impl Into<String>, details: impl Into<String>) -> Self {
        Self::ConfigInvalidValue {
            key: key.into(),
            details: details.into(),
        }
    }

    /// Create an invalid pattern error.
    pub fn invalid_pattern(pattern: impl Into<String>, details: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            details: details.into(),
        }
    }

    /// Create an empty test case error.
    pub fn empty_test_case(name: impl Into<String>) -> Self {
        Self::EmptyTestCase { name: name.into() }
    }

    /// Create an invalid suite error.
    pub fn invalid_suite(path: impl Into<String>, details: impl Into<String>) -> Self {
        Self::InvalidSuite {
            path: path.into(),
            details: details.into(),
        }
    }

    /// Create an actor failure error.
    pub fn actor_failed(message: impl Into<String>) -> Self {
        Self::ActorFailed(message.into())
    }

    /// Create a scoring unavailable error.
    pub fn scoring_unavailable(message: impl Into<String>) -> Self {
        Self::ScoringUnavailable(message.into())
    }

    /// Create a genetic operator error.
    pub fn genetic_operator(message: impl Into<String>) -> Self {
        Self::GeneticOperator(message.into())
    }

    /// Create an API response error.
    pub fn api_response(status: u16, message: impl Into<String>) -> Self {
        Self::ApiResponse {
            status,
            message: message.into(),
        }
    }

    /// Create a file read error.
    pub fn file_read_error(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::FileReadError {
            path: path.into(),
            source,
        }
    }

    /// Create a file write error.
    pub fn file_write_error(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::FileWriteError {
            path: path.into(),
            source,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

// =============================================================================
// ERROR METADATA
// =============================================================================

impl Error {
    /// Get the error code (e.g., "E001").
    pub fn code(&self) -> &'static str {
        match self {
            // Configuration
            Self::ConfigFileNotFound { .. } => "E001",
            Self::ConfigInvalidFormat { .. } => "E002",
            Self::ConfigMissingKey { .. } => "E003",
            Self::ConfigInvalidValue { .. } => "E004",
            Self::Config(_) => "E005",

            // Test suite
            Self::InvalidPattern { .. } => "E010",
            Self::EmptyTestCase { .. } => "E011",
            Self::NoTestCases => "E012",
            Self::NoSeedPrompts => "E013",
            Self::InvalidSuite { .. } => "E014",

            // Evaluation
            Self::ActorFailed(_) => "E020",
            Self::ActorTimeout { .. } => "E021",
            Self::ScoringUnavailable(_) => "E022",
            Self::Cancelled => "E023",

            // Selection / regeneration
            Self::NoSurvivors { .. } => "E030",
            Self::GeneticOperator(_) => "E031",
            Self::OperatorTimeout { .. } => "E032",

            // Transport
            Self::ApiTimeout { .. } => "E040",
            Self::ApiResponse { .. } => "E041",
            Self::ApiAuthFailed => "E042",
            Self::ApiRateLimited { .. } => "E043",
            Self::Http(_) => "E044",
            Self::ApiEmptyResponse(_) => "E045",

            // I/O
            Self::FileReadError { .. } => "E070",
            Self::FileWriteError { .. } => "E071",
            Self::Io(_) => "E072",

            // Serialization
            Self::Json(_) => "E080",
            Self::Yaml(_) => "E081",

            // Internal
            Self::Internal { .. } => "E090",
        }
    }

    /// Whether a retry loop may absorb this error.
    ///
    /// Actor failures and timeouts are always transient. Transport errors
    /// are transient when the server is overloaded or unreachable.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ActorFailed(_)
            | Self::ActorTimeout { .. }
            | Self::OperatorTimeout { .. }
            | Self::ApiTimeout { .. }
            | Self::ApiRateLimited { .. }
            | Self::ApiEmptyResponse(_) => true,
            Self::ApiResponse { status, .. } => *status == 429 || *status >= 500,
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status()
                        .map(|s| s.as_u16() == 429 || s.is_server_error())
                        .unwrap_or(false)
            }
            Self::Io(_) => true,
            _ => false,
        }
    }

    /// Whether this error must stop the run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigFileNotFound { .. }
                | Self::ConfigInvalidFormat { .. }
                | Self::ConfigMissingKey { .. }
                | Self::ConfigInvalidValue { .. }
                | Self::Config(_)
                | Self::InvalidPattern { .. }
                | Self::EmptyTestCase { .. }
                | Self::NoTestCases
                | Self::NoSeedPrompts
                | Self::InvalidSuite { .. }
                | Self::ScoringUnavailable(_)
                | Self::NoSurvivors { .. }
                | Self::GeneticOperator(_)
                | Self::ApiAuthFailed
                | Self::Internal { .. }
        )
    }

    /// Get a suggestion for how to resolve the error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::ConfigFileNotFound { .. } => {
                Some("Check the --config path, or omit it to use the default configuration")
            }
            Self::ConfigInvalidFormat { .. } => Some("Check the configuration file YAML syntax"),
            Self::ConfigMissingKey { .. } => Some("Add the missing key to your configuration"),
            Self::ConfigInvalidValue { .. } => {
                Some("Check the value against the documented range for this setting")
            }
            Self::Config(_) => Some("Check your configuration for errors"),

            Self::InvalidPattern { .. } => {
                Some("Fix the regular expression syntax of the contains expectation")
            }
            Self::EmptyTestCase { .. } => Some("Give every test case at least one turn"),
            Self::NoTestCases => Some("Add at least one test case to the suite"),
            Self::NoSeedPrompts => Some("Add at least one seed prompt to the suite"),
            Self::InvalidSuite { .. } => Some(
                "Check the suite YAML. Expectation kinds must be `contains` or `vector`",
            ),

            Self::ActorFailed(_) => Some("Check the actor backend; failures are retried per turn"),
            Self::ActorTimeout { .. } => Some("Increase actor_timeout_ms or check the backend"),
            Self::ScoringUnavailable(_) => Some(
                "Configure an embedding backend for vector expectations, \
                 or remove vector expectations from the suite",
            ),
            Self::Cancelled => None,

            Self::NoSurvivors { .. } => Some(
                "Every candidate failed every test case. Check the actor backend \
                 and the survivor_count setting",
            ),
            Self::GeneticOperator(_) => Some(
                "Check the completion backend, raise operator_retries, \
                 or set shortfall_policy to `tolerate`",
            ),
            Self::OperatorTimeout { .. } => Some("Increase operator_timeout_ms"),

            Self::ApiTimeout { .. } => Some("Check your network connection"),
            Self::ApiResponse { status, .. } if *status == 401 || *status == 403 => {
                Some("Check your API key. Set OPENAI_API_KEY")
            }
            Self::ApiResponse { status, .. } if *status == 429 => {
                Some("Rate limit exceeded. Lower concurrency_limit")
            }
            Self::ApiResponse { status, .. } if *status >= 500 => {
                Some("The API server is experiencing issues. Try again later")
            }
            Self::ApiResponse { .. } => Some("Check the API documentation for this status code"),
            Self::ApiAuthFailed => Some("Check your API key is correct and has not expired"),
            Self::ApiRateLimited { .. } => Some("Lower concurrency_limit and try again"),
            Self::Http(_) => Some("Check your network connection and try again"),
            Self::ApiEmptyResponse(_) => Some("The model returned no content. Try again"),

            Self::FileReadError { .. } => {
                Some("Check that the file exists and you have read permissions")
            }
            Self::FileWriteError { .. } => {
                Some("Check that you have write permissions for the target directory")
            }
            Self::Io(_) => Some("Check file permissions and disk space"),

            Self::Json(_) => Some("Check the JSON syntax for errors"),
            Self::Yaml(_) => Some("Check the YAML syntax for errors"),

            Self::Internal { .. } => Some("This is an internal error. Please report it"),
        }
    }

    /// Get the appropriate CLI exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigFileNotFound { .. }
            | Self::ConfigInvalidFormat { .. }
            | Self::ConfigMissingKey { .. }
            | Self::ConfigInvalidValue { .. }
            | Self::Config(_) => EXIT_CONFIG_ERROR,

            Self::InvalidPattern { .. }
            | Self::EmptyTestCase { .. }
            | Self::NoTestCases
            | Self::NoSeedPrompts
            | Self::InvalidSuite { .. } => EXIT_SUITE_ERROR,

            Self::ActorFailed(_)
            | Self::ActorTimeout { .. }
            | Self::ScoringUnavailable(_)
            | Self::Cancelled => EXIT_EVALUATION_ERROR,

            Self::NoSurvivors { .. } | Self::GeneticOperator(_) | Self::OperatorTimeout { .. } => {
                EXIT_SELECTION_ERROR
            }

            Self::ApiTimeout { .. }
            | Self::ApiResponse { .. }
            | Self::ApiAuthFailed
            | Self::ApiRateLimited { .. }
            | Self::Http(_)
            | Self::ApiEmptyResponse(_) => EXIT_API_ERROR,

            Self::FileReadError { .. }
            | Self::FileWriteError { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Yaml(_) => EXIT_IO_ERROR,

            Self::Internal { .. } => EXIT_INTERNAL_ERROR,
        }
    }
}

// =============================================================================
// ERROR DISPLAY UTILITIES
// =============================================================================

/// Display an error in a user-friendly format with suggestions.
pub fn display_error(err: &Error) {
    eprintln!("\n\x1b[1;31mError:\x1b[0m {}\n", err);

    if let Some(source) = std::error::Error::source(err) {
        eprintln!("\x1b[1;90mCaused by:\x1b[0m {}\n", source);
    }

    if let Some(suggestion) = err.suggestion() {
        eprintln!("\x1b[1;33mSuggestion:\x1b[0m {}\n", suggestion);
    }
}

// =============================================================================
// RESULT TYPE ALIAS
// =============================================================================

/// A Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::config_file_not_found("test.yaml").code(), "E001");
        assert_eq!(Error::invalid_pattern("[", "unclosed").code(), "E010");
        assert_eq!(Error::scoring_unavailable("no backend").code(), "E022");
        assert_eq!(Error::NoSurvivors { generation: 2 }.code(), "E030");
        assert_eq!(Error::api_response(500, "boom").code(), "E041");
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::actor_failed("connection reset").is_transient());
        assert!(Error::ActorTimeout { timeout_ms: 10 }.is_transient());
        assert!(Error::api_response(503, "unavailable").is_transient());
        assert!(Error::api_response(429, "slow down").is_transient());
        assert!(!Error::api_response(400, "bad request").is_transient());
        assert!(!Error::scoring_unavailable("down").is_transient());
        assert!(!Error::Cancelled.is_transient());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(Error::scoring_unavailable("down").is_fatal());
        assert!(Error::NoSurvivors { generation: 0 }.is_fatal());
        assert!(Error::genetic_operator("exhausted").is_fatal());
        assert!(!Error::actor_failed("flaky").is_fatal());
        assert!(!Error::Cancelled.is_fatal());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::NoTestCases.exit_code(), EXIT_SUITE_ERROR);
        assert_eq!(Error::Cancelled.exit_code(), EXIT_EVALUATION_ERROR);
        assert_eq!(
            Error::NoSurvivors { generation: 1 }.exit_code(),
            EXIT_SELECTION_ERROR
        );
        assert_eq!(Error::ApiAuthFailed.exit_code(), EXIT_API_ERROR);
    }

    #[test]
    fn test_error_display() {
        let err = Error::empty_test_case("greeting");
        let display = format!("{}", err);
        assert!(display.contains("E011"));
        assert!(display.contains("greeting"));
    }

    #[test]
    fn test_api_response_suggestions() {
        let err_401 = Error::api_response(401, "Unauthorized");
        assert!(err_401.suggestion().unwrap().contains("API key"));

        let err_429 = Error::api_response(429, "Too many requests");
        assert!(err_429.suggestion().unwrap().contains("Rate limit"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_bail_if_returns_error_on_true() {
        fn check_positive(n: i32) -> Result<()> {
            bail_if!(n < 0, Error::Config("must be non-negative".into()));
            Ok(())
        }

        assert!(check_positive(-1).is_err());
        assert!(check_positive(0).is_ok());
    }
}
