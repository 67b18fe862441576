//! Experiment entity

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    entities::{ExperimentResults, FaultDefinition, RecoveryConfig, Target},
    errors::DomainError,
    value_objects::{ExperimentId, ExperimentStatus, Priority},
};

/// What to do when a single fault fails to inject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InjectionFailurePolicy {
    /// Keep injecting the remaining faults
    #[default]
    ContinueBestEffort,
    /// Stop injecting, fail the run and clean up
    AbortOnFirstFailure,
}

/// A planned, time-boxed fault-injection exercise against a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: ExperimentId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub target: Target,
    pub faults: Vec<FaultDefinition>,
    /// Expected system behavior under fault
    #[serde(default)]
    pub hypothesis: String,
    /// Length of the observation window
    pub duration: Duration,
    /// Overall timeout; falls back to the executor default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub status: ExperimentStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub failure_policy: InjectionFailurePolicy,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    /// Run the lifecycle without calling any injector
    #[serde(default)]
    pub dry_run: bool,
    /// Who approved this experiment, if anyone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<ExperimentResults>,
}

impl Experiment {
    /// Create a pending experiment with a generated id
    pub fn new(name: impl Into<String>, target: Target, duration: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: ExperimentId::generate(),
            name: name.into(),
            description: String::new(),
            target,
            faults: Vec::new(),
            hypothesis: String::new(),
            duration,
            timeout: None,
            status: ExperimentStatus::Pending,
            priority: Priority::default(),
            failure_policy: InjectionFailurePolicy::default(),
            recovery: RecoveryConfig::default(),
            dry_run: false,
            approved_by: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            results: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<ExperimentId>) -> Self {
        self.id = id.into();
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_hypothesis(mut self, hypothesis: impl Into<String>) -> Self {
        self.hypothesis = hypothesis.into();
        self
    }

    #[must_use]
    pub fn with_fault(mut self, fault: FaultDefinition) -> Self {
        self.faults.push(fault);
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub const fn with_failure_policy(mut self, policy: InjectionFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    #[must_use]
    pub fn with_recovery(mut self, recovery: RecoveryConfig) -> Self {
        self.recovery = recovery;
        self
    }

    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[must_use]
    pub fn approved_by(mut self, approver: impl Into<String>) -> Self {
        self.approved_by = Some(approver.into());
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Structural validation, in order: id, name, faults, then per-fault checks
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.id.is_empty() {
            return Err(DomainError::validation("experiment id is required"));
        }
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("experiment name is required"));
        }
        if self.faults.is_empty() {
            return Err(DomainError::validation(
                "experiment must define at least one fault",
            ));
        }
        if self.duration.is_zero() {
            return Err(DomainError::validation(
                "experiment duration must be greater than zero",
            ));
        }

        let mut seen = HashSet::new();
        for fault in &self.faults {
            if !seen.insert(fault.id.as_str()) {
                return Err(DomainError::validation(format!(
                    "duplicate fault id '{}'",
                    fault.id
                )));
            }
            fault.validate()?;
        }
        Ok(())
    }

    /// Timeout to apply, given the executor default
    pub fn effective_timeout(&self, default: Duration) -> Duration {
        self.timeout.unwrap_or(default)
    }

    pub fn is_approved(&self) -> bool {
        self.approved_by
            .as_deref()
            .is_some_and(|a| !a.trim().is_empty())
    }

    /// Faults that are enabled
    pub fn enabled_faults(&self) -> impl Iterator<Item = &FaultDefinition> {
        self.faults.iter().filter(|f| f.enabled)
    }

    /// Move to `next`, stamping the matching timestamp
    ///
    /// Fails when the move would regress the lifecycle.
    pub fn transition_to(&mut self, next: ExperimentStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        if next == ExperimentStatus::Running {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Finalize with results; the status is taken from the results
    pub fn complete(&mut self, results: ExperimentResults) -> Result<(), DomainError> {
        self.transition_to(results.status)?;
        self.results = Some(results);
        Ok(())
    }
}
