//! Tracing and logging setup for the optimizer binary.
//!
//! Structured logging with a pretty or JSON formatter and `RUST_LOG`-style
//! level filtering.
//!
//! # Example
//!
//! ```rust,ignore
//! use actor_optimizer::tracing_setup::setup_logging;
//!
//! // Human-readable output (default)
//! setup_logging(false, "info");
//!
//! // JSON output for log shippers
//! setup_logging(true, "debug");
//! ```

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

/// Environment variable that switches the binary to JSON logs.
pub const LOG_JSON_ENV: &str = "ACTOR_OPTIMIZER_LOG_JSON";

/// Initialize the tracing subscriber with configurable format.
///
/// # Arguments
///
/// * `json` - If true, output logs in JSON format.
///   If false, use human-readable pretty format.
/// * `default_level` - Default filter if RUST_LOG is not set.
///   Options: "error", "warn", "info", "debug", "trace"
///
/// # Environment Variables
///
/// - `RUST_LOG`: Override log level filter (e.g., "actor_optimizer=debug")
/// - `ACTOR_OPTIMIZER_LOG_JSON`: Set to "1" or "true" to enable JSON output
pub fn setup_logging(json: bool, default_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        let subscriber = tracing_subscriber::registry().with(env_filter).with(
            fmt::layer()
                .json()
                .with_span_events(FmtSpan::CLOSE)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_writer(std::io::stderr),
        );
        subscriber.init();
    } else {
        let subscriber = tracing_subscriber::registry().with(env_filter).with(
            fmt::layer()
                .pretty()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_writer(std::io::stderr),
        );
        subscriber.init();
    }
}

/// Check if JSON logging is requested via environment variable.
pub fn should_use_json() -> bool {
    json_flag(std::env::var(LOG_JSON_ENV).ok().as_deref())
}

fn json_flag(value: Option<&str>) -> bool {
    value
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_flag_default() {
        assert!(!json_flag(None));
        assert!(!json_flag(Some("0")));
        assert!(!json_flag(Some("yes")));
    }

    #[test]
    fn test_json_flag_enabled() {
        assert!(json_flag(Some("1")));
        assert!(json_flag(Some("true")));
        assert!(json_flag(Some("TRUE")));
    }
}
