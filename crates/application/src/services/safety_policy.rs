//! Safety policy engine
//!
//! Evaluates every enabled rule of a policy against an experiment and
//! collects the violations. Evaluation is pure: the clock is an argument and
//! nothing is logged or stored here. The caller decides whether to admit,
//! deny or ask for approval.

use std::time::Duration;

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use domain::entities::{
    Experiment, PolicyAction, PolicyRule, PolicyViolation, RuleCondition, SafetyPolicy,
};
use domain::value_objects::Severity;
use serde::{Deserialize, Serialize};

use crate::error::ApplicationError;

/// Outcome of checking an experiment for admission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AdmissionDecision {
    /// No blocking violation
    Admit { warnings: Vec<PolicyViolation> },
    /// At least one deny rule was violated
    Deny { violations: Vec<PolicyViolation> },
    /// An approval rule was violated and the experiment has no approver
    RequireApproval { violations: Vec<PolicyViolation> },
}

impl AdmissionDecision {
    pub const fn is_admitted(&self) -> bool {
        matches!(self, Self::Admit { .. })
    }

    /// Violations that block admission, if any
    pub fn blocking(&self) -> &[PolicyViolation] {
        match self {
            Self::Admit { .. } => &[],
            Self::Deny { violations } | Self::RequireApproval { violations } => violations,
        }
    }

    /// Violation messages joined for an error
    pub fn summary(&self) -> String {
        self.blocking()
            .iter()
            .map(|v| v.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Safety policy engine
#[derive(Debug, Clone, Default)]
pub struct SafetyPolicyEngine {
    policy: SafetyPolicy,
}

impl SafetyPolicyEngine {
    /// Create an engine for the given policy
    #[must_use]
    pub const fn new(policy: SafetyPolicy) -> Self {
        Self { policy }
    }

    /// The policy this engine enforces
    pub const fn policy(&self) -> &SafetyPolicy {
        &self.policy
    }

    /// Violations of the engine's policy, evaluated now
    pub fn validate(&self, experiment: &Experiment) -> Vec<PolicyViolation> {
        Self::evaluate(experiment, &self.policy, Utc::now())
    }

    /// Violations of the engine's policy, evaluated at `now`
    pub fn validate_at(&self, experiment: &Experiment, now: DateTime<Utc>) -> Vec<PolicyViolation> {
        Self::evaluate(experiment, &self.policy, now)
    }

    /// Evaluate every enabled rule of `policy` against `experiment`
    ///
    /// Rules are independent: all of them run, so several violations can be
    /// reported at once. Rules with missing parameters are skipped.
    pub fn evaluate(
        experiment: &Experiment,
        policy: &SafetyPolicy,
        now: DateTime<Utc>,
    ) -> Vec<PolicyViolation> {
        policy
            .enabled_rules()
            .filter(|rule| rule.action != PolicyAction::Allow)
            .flat_map(|rule| evaluate_rule(rule, experiment, now))
            .collect()
    }

    /// Admission decision derived from the violations' actions
    ///
    /// Deny wins over approval. An approval violation is cleared when the
    /// experiment names an approver. Log and alert violations are warnings.
    pub fn decide(experiment: &Experiment, violations: Vec<PolicyViolation>) -> AdmissionDecision {
        let (blocking, warnings): (Vec<_>, Vec<_>) = violations.into_iter().partition(|v| {
            v.action.blocks()
                || (v.action == PolicyAction::RequireApproval && !experiment.is_approved())
        });

        if blocking.iter().any(|v| v.action.blocks()) {
            AdmissionDecision::Deny {
                violations: blocking,
            }
        } else if blocking.is_empty() {
            AdmissionDecision::Admit { warnings }
        } else {
            AdmissionDecision::RequireApproval {
                violations: blocking,
            }
        }
    }

    /// Admission decision for the engine's policy at `now`
    pub fn admission_at(&self, experiment: &Experiment, now: DateTime<Utc>) -> AdmissionDecision {
        Self::decide(experiment, self.validate_at(experiment, now))
    }

    /// Admission decision for the engine's policy, evaluated now
    pub fn admission(&self, experiment: &Experiment) -> AdmissionDecision {
        self.admission_at(experiment, Utc::now())
    }

    /// Fail if the experiment's target matches a forbidden-target rule
    pub fn check_forbidden_target(&self, experiment: &Experiment) -> Result<(), ApplicationError> {
        match self
            .policy
            .forbidden_targets()
            .into_iter()
            .find(|pattern| experiment.target.matches(pattern))
        {
            Some(_) => Err(ApplicationError::Validation(forbidden_message(experiment))),
            None => Ok(()),
        }
    }
}

fn forbidden_message(experiment: &Experiment) -> String {
    format!("target '{}' is forbidden by policy", experiment.target.name)
}

fn violation(rule: &PolicyRule, message: String) -> PolicyViolation {
    PolicyViolation {
        rule: rule.name.clone(),
        action: rule.action,
        severity: rule.severity,
        message,
    }
}

fn evaluate_rule(
    rule: &PolicyRule,
    experiment: &Experiment,
    now: DateTime<Utc>,
) -> Vec<PolicyViolation> {
    match &rule.condition {
        RuleCondition::ForbiddenTargets { targets } => targets
            .iter()
            .any(|pattern| experiment.target.matches(pattern))
            .then(|| violation(rule, forbidden_message(experiment)))
            .into_iter()
            .collect(),

        RuleCondition::MaxBlastRadius {
            max_percent,
            cluster_max_percent,
        } => {
            let Some(max_percent) = *max_percent else {
                return Vec::new();
            };
            let Some(percent) = experiment.target.blast_radius_percent() else {
                return Vec::new();
            };
            let limit = if experiment.target.scope.is_wide() {
                cluster_max_percent.unwrap_or(max_percent / 2.0)
            } else {
                max_percent
            };
            if percent > limit {
                vec![violation(
                    rule,
                    format!(
                        "blast radius {percent:.1}% exceeds the {limit:.1}% limit for {} targets",
                        experiment.target.scope
                    ),
                )]
            } else {
                Vec::new()
            }
        },

        RuleCondition::MaxDuration { max } => match max {
            Some(max) if experiment.duration > *max => vec![violation(
                rule,
                format!(
                    "duration exceeds policy limits: {} > {}",
                    format_duration(experiment.duration),
                    format_duration(*max)
                ),
            )],
            _ => Vec::new(),
        },

        RuleCondition::RequireApproval { min_severity } => {
            let threshold = min_severity.unwrap_or(Severity::Critical);
            experiment
                .faults
                .iter()
                .filter(|fault| fault.enabled && fault.severity >= threshold)
                .map(|fault| {
                    violation(
                        rule,
                        format!(
                            "fault '{}' has {} severity and requires approval",
                            fault.id, fault.severity
                        ),
                    )
                })
                .collect()
        },

        RuleCondition::TimeWindow {
            days,
            start_hour,
            end_hour,
        } => {
            let (Some(start), Some(end)) = (*start_hour, *end_hour) else {
                return Vec::new();
            };
            if in_window(now, days, start, end) {
                Vec::new()
            } else {
                vec![violation(
                    rule,
                    format!(
                        "experiment is outside the allowed time window ({start:02}:00-{end:02}:00 UTC)"
                    ),
                )]
            }
        },
    }
}

fn in_window(now: DateTime<Utc>, days: &[Weekday], start: u32, end: u32) -> bool {
    if !days.is_empty() && !days.contains(&now.weekday()) {
        return false;
    }
    let hour = now.hour();
    if start <= end {
        (start..end).contains(&hour)
    } else {
        // Window wraps midnight, e.g. 22-06
        hour >= start || hour < end
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs % 3600 == 0 && secs > 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 && secs > 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}
