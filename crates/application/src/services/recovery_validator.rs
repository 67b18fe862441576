//! Recovery validation
//!
//! After faults are removed the validator polls the registered health checks
//! on a fixed interval until all of them pass or the deadline is reached.
//! Polling happens inline on the caller's task, so nothing outlives a call.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use domain::entities::RecoveryResult;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, MissedTickBehavior, interval, sleep_until};
use tracing::{debug, instrument, warn};

use crate::error::ApplicationError;
use crate::ports::HealthCheckPort;

/// Metric name checked against `max_error_rate`
pub const ERROR_RATE_METRIC: &str = "error_rate";
/// Metric name checked against `min_success_rate`
pub const SUCCESS_RATE_METRIC: &str = "success_rate";

/// Recovery validation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryValidatorConfig {
    /// Time between health-check rounds
    #[serde(default = "default_poll_interval")]
    pub poll_interval: Duration,
    /// Upper bound on how long recovery may take
    #[serde(default = "default_max_recovery_time")]
    pub max_recovery_time: Duration,
    /// Highest acceptable error rate after recovery (0-1)
    #[serde(default = "default_max_error_rate")]
    pub max_error_rate: f64,
    /// Lowest acceptable success rate after recovery (0-1)
    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,
}

/// Shortest poll interval the validator accepts
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

const fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

const fn default_max_recovery_time() -> Duration {
    Duration::from_secs(300)
}

const fn default_max_error_rate() -> f64 {
    0.05
}

const fn default_min_success_rate() -> f64 {
    0.95
}

impl Default for RecoveryValidatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            max_recovery_time: default_max_recovery_time(),
            max_error_rate: default_max_error_rate(),
            min_success_rate: default_min_success_rate(),
        }
    }
}

impl RecoveryValidatorConfig {
    /// Raise a zero or tiny poll interval to the minimum
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.poll_interval < MIN_POLL_INTERVAL {
            warn!(
                configured_ms = u64::try_from(self.poll_interval.as_millis()).unwrap_or(u64::MAX),
                "Poll interval too small, using minimum"
            );
            self.poll_interval = MIN_POLL_INTERVAL;
        }
        self
    }
}

/// Polls health checks until the system has recovered
#[derive(Clone)]
pub struct RecoveryValidator {
    checks: HashMap<String, Arc<dyn HealthCheckPort>>,
    config: RecoveryValidatorConfig,
}

impl std::fmt::Debug for RecoveryValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.checks.keys().collect();
        names.sort();
        f.debug_struct("RecoveryValidator")
            .field("checks", &names)
            .field("config", &self.config)
            .finish()
    }
}

impl RecoveryValidator {
    #[must_use]
    pub fn new(config: RecoveryValidatorConfig) -> Self {
        Self {
            checks: HashMap::new(),
            config: config.normalized(),
        }
    }

    /// Register a named health check
    #[must_use]
    pub fn with_check(mut self, name: impl Into<String>, check: Arc<dyn HealthCheckPort>) -> Self {
        self.checks.insert(name.into(), check);
        self
    }

    pub const fn config(&self) -> &RecoveryValidatorConfig {
        &self.config
    }

    /// Resolve check names; an empty list selects every registered check
    ///
    /// Naming a check that is not registered is a configuration error.
    fn select(
        &self,
        names: &[String],
    ) -> Result<Vec<(String, Arc<dyn HealthCheckPort>)>, ApplicationError> {
        if names.is_empty() {
            return Ok(self
                .checks
                .iter()
                .map(|(name, check)| (name.clone(), Arc::clone(check)))
                .collect());
        }
        let unknown: Vec<&str> = names
            .iter()
            .filter(|name| !self.checks.contains_key(*name))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            warn!(checks = ?unknown, "Unknown health checks referenced");
            return Err(ApplicationError::Configuration(format!(
                "unknown health check(s): {}",
                unknown.join(", ")
            )));
        }
        Ok(names
            .iter()
            .filter_map(|name| {
                self.checks
                    .get(name)
                    .map(|check| (name.clone(), Arc::clone(check)))
            })
            .collect())
    }

    /// Run one round of checks; all must pass
    async fn run_round(checks: &[(String, Arc<dyn HealthCheckPort>)]) -> Result<(), String> {
        let outcomes = join_all(checks.iter().map(|(name, check)| async move {
            check.check().await.map_err(|e| format!("{name}: {e}"))
        }))
        .await;

        let failed: Vec<String> = outcomes.into_iter().filter_map(Result::err).collect();
        if failed.is_empty() {
            Ok(())
        } else {
            Err(failed.join("; "))
        }
    }

    /// Poll the named checks until they all pass or `timeout` elapses
    ///
    /// The effective deadline is the smaller of `timeout` and the configured
    /// `max_recovery_time`. Returns a `RecoveryTimeout` error when it passes.
    #[instrument(skip(self, names), fields(checks = names.len()))]
    pub async fn validate_recovery(
        &self,
        names: &[String],
        timeout: Duration,
    ) -> Result<RecoveryResult, ApplicationError> {
        let checks = self.select(names)?;
        let limit = timeout.min(self.config.max_recovery_time);
        let start = Instant::now();
        let deadline = start.checked_add(limit).unwrap_or_else(|| start + FAR_FUTURE);

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut attempts = 0u32;
        let mut last_error = String::from("no health check round completed");

        loop {
            tokio::select! {
                biased;
                () = sleep_until(deadline) => break,
                _ = ticker.tick() => {},
            }

            attempts += 1;
            match Self::run_round(&checks).await {
                Ok(()) => {
                    let elapsed = start.elapsed();
                    debug!(attempts, elapsed_ms = elapsed.as_millis() as u64, "System recovered");
                    return Ok(RecoveryResult::recovered(elapsed, attempts));
                },
                Err(e) => {
                    debug!(attempts, error = %e, "Health checks still failing");
                    last_error = e;
                },
            }

            if Instant::now() >= deadline {
                break;
            }
        }

        warn!(attempts, error = %last_error, "Recovery timed out");
        Err(ApplicationError::RecoveryTimeout {
            elapsed: start.elapsed(),
            message: last_error,
        })
    }

    /// Like `validate_recovery`, but folds the outcome into a `RecoveryResult`
    pub async fn recover(&self, names: &[String], timeout: Duration) -> RecoveryResult {
        let start = Instant::now();
        match self.validate_recovery(names, timeout).await {
            Ok(result) => result,
            Err(ApplicationError::RecoveryTimeout { elapsed, message }) => {
                let polls = polls_within(elapsed, self.config.poll_interval);
                RecoveryResult::failed(elapsed, polls, format!("recovery timed out: {message}"))
            },
            Err(e) => RecoveryResult::failed(start.elapsed(), 0, e.to_string()),
        }
    }

    /// Check post-recovery metrics against the configured thresholds
    ///
    /// Missing metrics are not checked.
    pub fn validate_metrics(&self, metrics: &BTreeMap<String, f64>) -> Result<(), ApplicationError> {
        let mut problems = Vec::new();
        if let Some(error_rate) = metrics.get(ERROR_RATE_METRIC) {
            if *error_rate > self.config.max_error_rate {
                problems.push(format!(
                    "error rate {error_rate:.3} exceeds maximum {:.3}",
                    self.config.max_error_rate
                ));
            }
        }
        if let Some(success_rate) = metrics.get(SUCCESS_RATE_METRIC) {
            if *success_rate < self.config.min_success_rate {
                problems.push(format!(
                    "success rate {success_rate:.3} below minimum {:.3}",
                    self.config.min_success_rate
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ApplicationError::Validation(problems.join("; ")))
        }
    }
}

/// Stand-in deadline for limits too large to add to an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[allow(clippy::cast_possible_truncation)]
fn polls_within(elapsed: Duration, poll_interval: Duration) -> u32 {
    if poll_interval.is_zero() {
        return 1;
    }
    (elapsed.as_nanos() / poll_interval.as_nanos()) as u32 + 1
}
