//! Timeouts, retries and cancellation for calls into external services.
//!
//! Every actor invocation and every genetic-operator invocation in the engine
//! is a suspending call to something that may be slow or broken. This module
//! provides the pieces those call sites are built from:
//!
//! - **Timeout Wrappers**: bound a single call and map the elapsed case to a
//!   domain error
//! - **Cancellation**: a cloneable signal observed by every in-flight call
//! - **Retry Utilities**: exponential backoff with jitter for transport calls
//!
//! # Architecture
//!
//! ```text
//! Call site (runner / regenerator / transport)
//!    |
//!    v
//! +------------------+
//! |   Cancellable    |  <-- abort as soon as the run is cancelled
//! +------------------+
//!    |
//!    v
//! +------------------+
//! | Timeout Wrapper  |  <-- enforce the per-call budget
//! +------------------+
//!    |
//!    v
//! +------------------+
//! |  External Call   |
//! +------------------+
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use actor_optimizer::recovery::{cancellable, with_timeout, CancellationSignal};
//! use std::time::Duration;
//!
//! let signal = CancellationSignal::new();
//! let reply = cancellable(
//!     &signal,
//!     with_timeout(Duration::from_secs(10), actor.respond(&history), |ms| {
//!         Error::ActorTimeout { timeout_ms: ms }
//!     }),
//! )
//! .await?;
//! ```

use crate::{Error, Result};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// =============================================================================
// CANCELLATION
// =============================================================================

/// A run-wide cancellation flag.
///
/// Clones share the same flag. Once cancelled it stays cancelled.
///
/// # Example
///
/// ```rust,ignore
/// let signal = CancellationSignal::new();
/// let observer = signal.clone();
///
/// tokio::spawn(async move {
///     observer.cancelled().await;
///     println!("stopping");
/// });
///
/// signal.cancel();
/// ```
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl CancellationSignal {
    /// Create a new, not yet cancelled signal.
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Cancel the run. Idempotent.
    pub fn cancel(&self) {
        let was_cancelled = self.sender.send_replace(true);
        if !was_cancelled {
            info!("Cancellation requested");
        }
    }

    /// Whether the signal has fired.
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolve once the signal fires.
    ///
    /// Returns immediately if it already has.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        if *receiver.borrow_and_update() {
            return;
        }
        while receiver.changed().await.is_ok() {
            if *receiver.borrow_and_update() {
                return;
            }
        }
        // The sender lives as long as `self`, so this is unreachable in practice.
        std::future::pending::<()>().await
    }

    /// Fire the signal after `duration` unless the returned task is aborted first.
    pub fn cancel_after(&self, duration: Duration) -> JoinHandle<()> {
        let signal = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            warn!("Deadline of {:?} reached", duration);
            signal.cancel();
        })
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Race a future against the cancellation signal.
///
/// Returns [`Error::Cancelled`] if the signal fires first. The losing future
/// is dropped, which aborts the in-flight call.
pub async fn cancellable<T, F>(signal: &CancellationSignal, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if signal.is_cancelled() {
        return Err(Error::Cancelled);
    }
    tokio::select! {
        biased;
        _ = signal.cancelled() => Err(Error::Cancelled),
        result = future => result,
    }
}

// =============================================================================
// TIMEOUT WRAPPERS
// =============================================================================

/// Execute a future with a timeout.
///
/// `on_elapsed` receives the budget in milliseconds and builds the error
/// reported when it is exceeded.
///
/// # Example
///
/// ```rust,ignore
/// let child = with_timeout(Duration::from_secs(30), operator.mutate(&parent), |ms| {
///     Error::OperatorTimeout { timeout_ms: ms }
/// })
/// .await?;
/// ```
pub async fn with_timeout<T, F, E>(duration: Duration, future: F, on_elapsed: E) -> Result<T>
where
    F: Future<Output = Result<T>>,
    E: FnOnce(u64) -> Error,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(on_elapsed(duration.as_millis() as u64)),
    }
}

// =============================================================================
// RETRY UTILITIES
// =============================================================================

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,
    /// Add jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Retry configuration with no waiting between attempts.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    /// Calculate delay for a given attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        let final_delay = if self.jitter {
            // Add up to 25% jitter
            let jitter_factor = 1.0 + rand::thread_rng().gen_range(0.0..0.25);
            delay_secs * jitter_factor
        } else {
            delay_secs
        };

        Duration::from_secs_f64(final_delay)
    }
}

/// Execute a function with retries.
///
/// Only errors for which [`Error::is_transient`] holds are retried; anything
/// else is returned at once.
///
/// # Returns
///
/// The result of the first successful attempt, or the last error.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let delay = config.delay_for_attempt(attempt - 1);
            debug!("Retry attempt {}, waiting {:?}", attempt, delay);
            tokio::time::sleep(delay).await;
        }

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !e.is_transient() {
                    debug!("Non-retryable error: {}", e);
                    return Err(e);
                }
                warn!("Attempt {} failed: {}", attempt + 1, e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::internal("retry loop ran zero attempts")))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ==========================================================================
    // Cancellation Tests
    // ==========================================================================

    #[tokio::test]
    async fn test_signal_starts_clear() {
        let signal = CancellationSignal::new();
        assert!(!signal.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_is_shared_between_clones() {
        let signal = CancellationSignal::new();
        let clone = signal.clone();
        clone.cancel();
        assert!(signal.is_cancelled());
        // Already cancelled resolves immediately.
        signal.cancelled().await;
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let signal = CancellationSignal::new();
        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        tokio::task::yield_now().await;
        signal.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancellable_aborts_pending_future() {
        let signal = CancellationSignal::new();
        let trigger = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result: Result<()> = cancellable(&signal, async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancellable_passes_through_result() {
        let signal = CancellationSignal::new();
        let result = cancellable(&signal, async { Ok::<_, Error>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_fires() {
        let signal = CancellationSignal::new();
        let _deadline = signal.cancel_after(Duration::from_secs(5));
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(signal.is_cancelled());
    }

    // ==========================================================================
    // Timeout Tests
    // ==========================================================================

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(
            Duration::from_secs(1),
            async { Ok::<_, Error>("success") },
            |ms| Error::ActorTimeout { timeout_ms: ms },
        )
        .await;
        assert_eq!(result.unwrap(), "success");
    }

    #[tokio::test]
    async fn test_with_timeout_maps_elapsed() {
        let result: Result<()> = with_timeout(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            |ms| Error::OperatorTimeout { timeout_ms: ms },
        )
        .await;
        assert!(matches!(
            result,
            Err(Error::OperatorTimeout { timeout_ms: 10 })
        ));
    }

    // ==========================================================================
    // Retry Tests
    // ==========================================================================

    #[test]
    fn test_retry_config_delay() {
        let config = RetryConfig {
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            jitter: false,
            ..Default::default()
        };

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn test_retry_config_max_delay() {
        let config = RetryConfig {
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 10.0,
            max_delay: Duration::from_secs(5),
            jitter: false,
            ..Default::default()
        };

        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_with_retry_recovers_from_transient() {
        let calls = AtomicUsize::new(0);
        let result = with_retry(&RetryConfig::immediate(3), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::api_response(503, "busy"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_stops_on_permanent_error() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = with_retry(&RetryConfig::immediate(5), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::ApiAuthFailed) }
        })
        .await;

        assert!(matches!(result, Err(Error::ApiAuthFailed)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
