//! Executor, recovery and scheduler settings
//!
//! Durations are plain seconds here so they read naturally in TOML and
//! environment variables; each section converts into the matching
//! application config.

use std::time::Duration;

use application::{AdmissionMode, ExecutorConfig, RecoveryValidatorConfig, SchedulerConfig};
use domain::entities::InjectionFailurePolicy;
use serde::{Deserialize, Serialize};

/// Experiment executor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorSettings {
    /// Seconds between metric samples while observing
    #[serde(default = "default_monitoring_interval_secs")]
    pub monitoring_interval_secs: u64,

    /// Timeout for experiments that set none
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// Forces one injection failure policy on every experiment
    #[serde(default)]
    pub failure_policy: Option<InjectionFailurePolicy>,
}

const fn default_monitoring_interval_secs() -> u64 {
    10
}

const fn default_timeout_secs() -> u64 {
    30 * 60
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            monitoring_interval_secs: default_monitoring_interval_secs(),
            default_timeout_secs: default_timeout_secs(),
            failure_policy: None,
        }
    }
}

impl From<&ExecutorSettings> for ExecutorConfig {
    fn from(settings: &ExecutorSettings) -> Self {
        Self {
            monitoring_interval: Duration::from_secs(settings.monitoring_interval_secs.max(1)),
            default_timeout: Duration::from_secs(settings.default_timeout_secs),
            failure_policy: settings.failure_policy,
        }
    }
}

/// Recovery validation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoverySettings {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Give up on recovery after this many seconds
    #[serde(default = "default_max_recovery_time_secs")]
    pub max_recovery_time_secs: u64,

    #[serde(default = "default_max_error_rate")]
    pub max_error_rate: f64,

    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,
}

const fn default_poll_interval_secs() -> u64 {
    5
}

const fn default_max_recovery_time_secs() -> u64 {
    300
}

const fn default_max_error_rate() -> f64 {
    0.05
}

const fn default_min_success_rate() -> f64 {
    0.95
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_recovery_time_secs: default_max_recovery_time_secs(),
            max_error_rate: default_max_error_rate(),
            min_success_rate: default_min_success_rate(),
        }
    }
}

impl From<&RecoverySettings> for RecoveryValidatorConfig {
    fn from(settings: &RecoverySettings) -> Self {
        Self {
            poll_interval: Duration::from_secs(settings.poll_interval_secs.max(1)),
            max_recovery_time: Duration::from_secs(settings.max_recovery_time_secs),
            max_error_rate: settings.max_error_rate,
            min_success_rate: settings.min_success_rate,
        }
    }
}

/// Admission control settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default = "default_max_concurrent_experiments")]
    pub max_concurrent_experiments: usize,

    /// `reject` refuses experiments over the limit, `queue` makes them wait
    #[serde(default)]
    pub admission_mode: AdmissionMode,
}

const fn default_max_concurrent_experiments() -> usize {
    5
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_concurrent_experiments: default_max_concurrent_experiments(),
            admission_mode: AdmissionMode::default(),
        }
    }
}

impl From<&SchedulerSettings> for SchedulerConfig {
    fn from(settings: &SchedulerSettings) -> Self {
        Self {
            max_concurrent_experiments: settings.max_concurrent_experiments,
            admission_mode: settings.admission_mode,
        }
    }
}
