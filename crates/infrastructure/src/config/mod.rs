//! Engine configuration
//!
//! Loaded in layers: built-in defaults, then an optional `chaos.toml`, then
//! `CHAOS_` environment variables with `__` between nested keys
//! (e.g. `CHAOS_SCHEDULER__MAX_CONCURRENT_EXPERIMENTS=2`).

mod database;
mod engine;

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use application::RegionPlan;
use domain::entities::SafetyPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use database::DatabaseConfig;
pub use engine::{ExecutorSettings, RecoverySettings, SchedulerSettings};

use crate::health::{HttpCheckSettings, MetricsSourceSettings};
use crate::retry::RetryConfig;
use crate::telemetry::TelemetryConfig;

/// Default config file name, looked up in the working directory
pub const CONFIG_FILE: &str = "chaos";
/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "CHAOS";

pub(crate) const fn default_true() -> bool {
    true
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        })
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "staging" | "stage" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(format!(
                "Invalid environment: {s}. Use 'development', 'staging' or 'production'"
            )),
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub environment: Environment,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub executor: ExecutorSettings,

    #[serde(default)]
    pub recovery: RecoverySettings,

    #[serde(default)]
    pub scheduler: SchedulerSettings,

    /// Backoff for fault backend calls
    #[serde(default)]
    pub backend_retry: RetryConfig,

    /// Safety policy applied at admission
    #[serde(default)]
    pub policy: SafetyPolicy,

    /// Regions for multi-region runs
    #[serde(default)]
    pub regions: Vec<RegionPlan>,

    /// HTTP health checks polled during recovery
    #[serde(default)]
    pub health_checks: Vec<HttpCheckSettings>,

    /// HTTP endpoint sampled for metrics while observing
    #[serde(default)]
    pub metrics: Option<MetricsSourceSettings>,
}

impl AppConfig {
    /// Load from `chaos.toml` (if present) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load from an explicit file instead of `chaos.toml`
    ///
    /// An explicit file must exist.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(CONFIG_FILE).required(false),
        };

        let config: Self = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        debug!(environment = %config.environment, regions = config.regions.len(), "configuration loaded");
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.max_concurrent_experiments == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.max_concurrent_experiments must be at least 1".into(),
            ));
        }
        for (field, value) in [
            ("recovery.max_error_rate", self.recovery.max_error_rate),
            ("recovery.min_success_rate", self.recovery.min_success_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{field} must be within 0..=1, got {value}"
                )));
            }
        }

        let mut seen = HashSet::new();
        for region in &self.regions {
            if region.name.trim().is_empty() {
                return Err(ConfigError::Invalid("region names must not be blank".into()));
            }
            if !seen.insert(region.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "region '{}' is listed twice",
                    region.name
                )));
            }
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use application::{AdmissionMode, GateCondition};
    use domain::entities::RuleCondition;

    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.database.path, "chaos.db");
        assert_eq!(config.scheduler.max_concurrent_experiments, 5);
        assert!(config.regions.is_empty());
    }

    #[test]
    fn environment_parses_aliases() {
        assert_eq!("prod".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!("Stage".parse::<Environment>(), Ok(Environment::Staging));
        assert!("qa".parse::<Environment>().is_err());
        assert_eq!(Environment::Development.to_string(), "development");
    }

    #[test]
    fn loads_sections_from_file() {
        let file = write_config(
            r#"
            environment = "production"

            [scheduler]
            max_concurrent_experiments = 2
            admission_mode = "queue"

            [executor]
            monitoring_interval_secs = 3

            [backend_retry]
            max_retries = 7

            [policy]
            name = "prod-guardrails"

            [[policy.rules]]
            name = "no-payments"
            condition = { kind = "forbidden_targets", targets = ["payments*"] }

            [[regions]]
            name = "eu-west"

            [[regions]]
            name = "us-east"
            condition = { condition = "all_previous_succeeded" }
            "#,
        );

        let config = AppConfig::load_from(Some(file.path())).unwrap();

        assert!(config.is_production());
        assert_eq!(config.scheduler.max_concurrent_experiments, 2);
        assert_eq!(config.scheduler.admission_mode, AdmissionMode::Queue);
        assert_eq!(config.executor.monitoring_interval_secs, 3);
        assert_eq!(config.executor.default_timeout_secs, 1800);
        assert_eq!(config.backend_retry.max_retries, 7);
        assert_eq!(config.policy.rules.len(), 1);
        assert!(matches!(
            config.policy.rules[0].condition,
            RuleCondition::ForbiddenTargets { .. }
        ));
        assert_eq!(config.regions.len(), 2);
        assert_eq!(
            config.regions[1].condition,
            Some(GateCondition::AllPreviousSucceeded)
        );
    }

    #[test]
    fn duplicate_regions_are_rejected() {
        let file = write_config(
            r#"
            [[regions]]
            name = "eu-west"

            [[regions]]
            name = "eu-west"
            "#,
        );
        let err = AppConfig::load_from(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let file = write_config("[scheduler]\nmax_concurrent_experiments = 0\n");
        assert!(AppConfig::load_from(Some(file.path())).is_err());
    }

    #[test]
    fn explicit_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AppConfig::load_from(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
