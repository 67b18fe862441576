//! Safety policies
//!
//! A policy is a list of independent rules. Each rule carries a condition and
//! the action to take when the condition is violated. Evaluation lives in the
//! application layer; this module only defines the data.

use std::fmt;
use std::time::Duration;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::value_objects::Severity;

/// What happens when a rule is violated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    Allow,
    #[default]
    Deny,
    RequireApproval,
    Log,
    Alert,
}

impl PolicyAction {
    /// Whether a violation with this action blocks admission outright
    pub const fn blocks(&self) -> bool {
        matches!(self, Self::Deny)
    }
}

/// Condition checked by a rule
///
/// Parameters are optional in the serialized form; a rule whose parameters
/// are missing is skipped during evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCondition {
    /// Targets that must never be experimented on
    ForbiddenTargets {
        #[serde(default)]
        targets: Vec<String>,
    },

    /// Maximum share of instances an experiment may affect
    MaxBlastRadius {
        #[serde(default)]
        max_percent: Option<f64>,
        /// Limit for cluster and region scoped targets; half of
        /// `max_percent` when unset
        #[serde(default)]
        cluster_max_percent: Option<f64>,
    },

    /// Maximum experiment duration
    MaxDuration {
        #[serde(default)]
        max: Option<Duration>,
    },

    /// Faults at or above this severity need an approver
    RequireApproval {
        #[serde(default)]
        min_severity: Option<Severity>,
    },

    /// Experiments may only start inside this window (UTC)
    TimeWindow {
        /// Allowed weekdays; empty means every day
        #[serde(default)]
        days: Vec<Weekday>,
        #[serde(default)]
        start_hour: Option<u32>,
        /// Exclusive end hour
        #[serde(default)]
        end_hour: Option<u32>,
    },
}

impl RuleCondition {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ForbiddenTargets { .. } => "forbidden_targets",
            Self::MaxBlastRadius { .. } => "max_blast_radius",
            Self::MaxDuration { .. } => "max_duration",
            Self::RequireApproval { .. } => "require_approval",
            Self::TimeWindow { .. } => "time_window",
        }
    }
}

/// A single policy rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub name: String,
    pub condition: RuleCondition,
    #[serde(default)]
    pub action: PolicyAction,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

const fn default_enabled() -> bool {
    true
}

impl PolicyRule {
    /// Create an enabled rule that denies on violation
    pub fn new(name: impl Into<String>, condition: RuleCondition) -> Self {
        Self {
            name: name.into(),
            condition,
            action: PolicyAction::Deny,
            severity: Severity::Medium,
            enabled: true,
        }
    }

    #[must_use]
    pub const fn with_action(mut self, action: PolicyAction) -> Self {
        self.action = action;
        self
    }

    #[must_use]
    pub const fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A named set of rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SafetyPolicy {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

impl SafetyPolicy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_rule(mut self, rule: PolicyRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Enabled rules in declaration order
    pub fn enabled_rules(&self) -> impl Iterator<Item = &PolicyRule> {
        self.rules.iter().filter(|r| r.enabled)
    }

    /// Every forbidden-target pattern from enabled rules
    pub fn forbidden_targets(&self) -> Vec<&str> {
        self.enabled_rules()
            .filter_map(|r| match &r.condition {
                RuleCondition::ForbiddenTargets { targets } => Some(targets),
                _ => None,
            })
            .flatten()
            .map(String::as_str)
            .collect()
    }
}

/// A rule violated by an experiment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub rule: String,
    pub action: PolicyAction,
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_targets_ignore_disabled_rules() {
        let policy = SafetyPolicy::new("prod")
            .with_rule(PolicyRule::new(
                "no-db",
                RuleCondition::ForbiddenTargets {
                    targets: vec!["primary-db".to_string()],
                },
            ))
            .with_rule(
                PolicyRule::new(
                    "no-auth",
                    RuleCondition::ForbiddenTargets {
                        targets: vec!["auth".to_string()],
                    },
                )
                .disabled(),
            );

        assert_eq!(policy.forbidden_targets(), vec!["primary-db"]);
    }

    #[test]
    fn rule_parameters_are_optional_in_toml() {
        let policy: SafetyPolicy = toml::from_str(
            r#"
            name = "default"

            [[rules]]
            name = "blast"
            condition = { kind = "max_blast_radius" }

            [[rules]]
            name = "window"
            action = "log"
            condition = { kind = "time_window", days = ["Mon", "Tue"], start_hour = 9, end_hour = 17 }
            "#,
        )
        .unwrap();

        assert_eq!(policy.rules.len(), 2);
        assert_eq!(
            policy.rules[0].condition,
            RuleCondition::MaxBlastRadius {
                max_percent: None,
                cluster_max_percent: None
            }
        );
        assert_eq!(policy.rules[1].action, PolicyAction::Log);
        assert!(policy.rules[1].enabled);
    }

    #[test]
    fn only_deny_blocks() {
        assert!(PolicyAction::Deny.blocks());
        assert!(!PolicyAction::RequireApproval.blocks());
        assert!(!PolicyAction::Log.blocks());
    }
}
