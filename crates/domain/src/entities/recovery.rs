//! Recovery settings and outcome

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the system is brought back after faults are removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Poll health checks after removal
    #[serde(default = "default_true")]
    pub automatic: bool,
    /// Deadline for all health checks to pass
    #[serde(default = "default_timeout")]
    pub timeout: Duration,
    /// Attempts per fault removal before giving up
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Delay between removal attempts
    #[serde(default = "default_retry_delay")]
    pub retry_delay: Duration,
    /// Re-issue removal of every injected fault when recovery fails
    #[serde(default = "default_true")]
    pub rollback: bool,
    /// Names of the health checks that must pass
    #[serde(default)]
    pub health_checks: Vec<String>,
}

const fn default_true() -> bool {
    true
}

const fn default_timeout() -> Duration {
    Duration::from_secs(300)
}

const fn default_retry_attempts() -> u32 {
    3
}

const fn default_retry_delay() -> Duration {
    Duration::from_secs(1)
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            automatic: true,
            timeout: default_timeout(),
            retry_attempts: default_retry_attempts(),
            retry_delay: default_retry_delay(),
            rollback: true,
            health_checks: Vec::new(),
        }
    }
}

impl RecoveryConfig {
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_retries(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay = delay;
        self
    }

    #[must_use]
    pub fn with_health_check(mut self, name: impl Into<String>) -> Self {
        self.health_checks.push(name.into());
        self
    }

    /// Attempts per removal, never less than one
    pub fn removal_attempts(&self) -> u32 {
        self.retry_attempts.max(1)
    }
}

/// Outcome of the recovery phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RecoveryResult {
    /// Whether recovery ran at all
    pub attempted: bool,
    /// Whether every health check passed before the deadline
    pub successful: bool,
    /// Time from the first poll to the outcome
    pub duration: Duration,
    /// Number of health-check polls
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecoveryResult {
    /// Recovery was skipped
    pub fn not_attempted() -> Self {
        Self::default()
    }

    /// All checks passed
    pub const fn recovered(duration: Duration, attempts: u32) -> Self {
        Self {
            attempted: true,
            successful: true,
            duration,
            attempts,
            error: None,
        }
    }

    /// Recovery ran but did not succeed
    pub fn failed(duration: Duration, attempts: u32, error: impl Into<String>) -> Self {
        Self {
            attempted: true,
            successful: false,
            duration,
            attempts,
            error: Some(error.into()),
        }
    }

    /// Attempted and not successful
    pub const fn is_failure(&self) -> bool {
        self.attempted && !self.successful
    }
}
