//! Retry with exponential backoff for fault backend calls
//!
//! Backend calls cross a process or network boundary, so transient failures
//! are retried a bounded number of times before the injector gives up.
//!
//! ```rust,ignore
//! use infrastructure::retry::{RetryConfig, retry};
//!
//! let config = RetryConfig::default();
//! retry(&config, || backend.apply(&handle, &target, &effect)).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Backoff settings for backend calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay before the first retry in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound on any single delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Growth factor between consecutive delays
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Retries after the first attempt; 0 disables retrying
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Random spread applied to each delay (0.0 to 1.0); 0 disables jitter
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

const fn default_initial_delay_ms() -> u64 {
    200
}

const fn default_max_delay_ms() -> u64 {
    5_000
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_jitter_factor() -> f64 {
    0.1
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            max_retries: default_max_retries(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub const fn new(initial_delay_ms: u64, max_delay_ms: u64, max_retries: u32) -> Self {
        Self {
            initial_delay_ms,
            max_delay_ms,
            multiplier: default_multiplier(),
            max_retries,
            jitter_factor: default_jitter_factor(),
        }
    }

    /// Single attempt, no retries
    #[must_use]
    pub const fn none() -> Self {
        Self {
            initial_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1.0,
            max_retries: 0,
            jitter_factor: 0.0,
        }
    }

    /// Deterministic delays, mostly for tests
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter_factor = 0.0;
        self
    }

    /// Delay before retry number `attempt` (0-indexed)
    ///
    /// `initial * multiplier^attempt`, capped at `max_delay_ms`, then spread by
    /// up to `jitter_factor` in either direction.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_wrap,
        clippy::cast_sign_loss,
        clippy::cast_possible_truncation
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(64) as i32;
        let base = (self.initial_delay_ms as f64) * self.multiplier.powi(exponent);
        let capped = base.min(self.max_delay_ms as f64);

        let spread = capped * self.jitter_factor.clamp(0.0, 1.0);
        let millis = if spread > 0.0 {
            capped + rand::rng().random_range(-spread..=spread)
        } else {
            capped
        };

        Duration::from_millis(millis.max(0.0) as u64)
    }
}

/// Errors that know whether another attempt could succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for application::ApplicationError {
    fn is_retryable(&self) -> bool {
        Self::is_retryable(self)
    }
}

/// Final outcome plus how much retrying it took
#[derive(Debug)]
pub struct RetryResult<T, E> {
    pub result: Result<T, E>,
    /// 1 means the first attempt settled it
    pub attempts: u32,
}

impl<T, E> RetryResult<T, E> {
    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

/// Run `operation` until it succeeds, fails permanently, or retries run out
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let err = match operation().await {
            Ok(value) => {
                if attempts > 1 {
                    debug!(attempts, "backend call succeeded after retrying");
                }
                return RetryResult {
                    result: Ok(value),
                    attempts,
                };
            },
            Err(err) => err,
        };

        let retries_done = attempts - 1;
        if !err.is_retryable() || retries_done >= config.max_retries {
            if err.is_retryable() {
                warn!(attempts, error = %err, "giving up on backend call");
            }
            return RetryResult {
                result: Err(err),
                attempts,
            };
        }

        let delay = config.delay_for_attempt(retries_done);
        warn!(
            attempt = attempts,
            max_retries = config.max_retries,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "backend call failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

/// [`with_retry`] without the attempt count
pub async fn retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    with_retry(config, operation).await.into_result()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use application::ApplicationError;

    use super::*;

    #[test]
    fn defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.initial_delay_ms, 200);
        assert_eq!(config.max_delay_ms, 5_000);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn delays_grow_and_cap() {
        let config = RetryConfig::new(100, 350, 5).without_jitter();
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(config.delay_for_attempt(40), Duration::from_millis(350));
    }

    #[test]
    fn jitter_stays_within_spread() {
        let config = RetryConfig::new(1_000, 1_000, 3);
        for _ in 0..100 {
            let ms = config.delay_for_attempt(0).as_millis();
            assert!((900..=1_100).contains(&ms), "{ms}");
        }
    }

    #[test]
    fn none_has_zero_delay() {
        assert_eq!(RetryConfig::none().delay_for_attempt(3), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_backend_errors_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let outcome = with_retry(&RetryConfig::default().without_jitter(), || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ApplicationError::Backend("connection reset".into()))
                } else {
                    Ok("applied")
                }
            }
        })
        .await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.into_result().unwrap(), "applied");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), _> = retry(&RetryConfig::default(), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(ApplicationError::Validation("bad params".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let outcome: RetryResult<(), _> = with_retry(&RetryConfig::new(10, 10, 2), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(ApplicationError::Backend("unreachable".into())) }
        })
        .await;

        assert_eq!(outcome.attempts, 3);
        assert!(outcome.result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
