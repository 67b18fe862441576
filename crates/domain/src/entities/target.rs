//! Experiment target

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value_objects::TargetScope;

/// The system component an experiment injects faults into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Kind of component (service, pod, node, database, ...)
    pub kind: String,
    /// Human-readable name
    pub name: String,
    /// Address, hostname or resource id used by injectors
    pub identifier: String,
    /// How much of the infrastructure the target spans
    #[serde(default)]
    pub scope: TargetScope,
    /// Label selector for multi-instance targets
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Total number of instances behind this target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_instances: Option<u32>,
    /// Number of instances the experiment affects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_instances: Option<u32>,
}

impl Target {
    /// Create a single-instance target whose identifier is its name
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            kind: kind.into(),
            identifier: name.clone(),
            name,
            scope: TargetScope::default(),
            selector: BTreeMap::new(),
            namespace: None,
            region: None,
            total_instances: None,
            affected_instances: None,
        }
    }

    #[must_use]
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    #[must_use]
    pub const fn with_scope(mut self, scope: TargetScope) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.selector.insert(key.into(), value.into());
        self
    }

    /// Record how many of the total instances are affected
    #[must_use]
    pub const fn with_instances(mut self, affected: u32, total: u32) -> Self {
        self.affected_instances = Some(affected);
        self.total_instances = Some(total);
        self
    }

    /// Percentage of instances affected by the experiment
    ///
    /// Returns `None` when the instance counts are unknown. A single-instance
    /// target with a known total affects exactly one instance.
    pub fn blast_radius_percent(&self) -> Option<f64> {
        let total = self.total_instances.filter(|t| *t > 0)?;
        let affected = match (self.affected_instances, self.scope) {
            (Some(affected), _) => affected.min(total),
            (None, TargetScope::SingleInstance) => 1,
            (None, TargetScope::Cluster | TargetScope::Region) => total,
            (None, TargetScope::Multiple) => return None,
        };
        Some(f64::from(affected) / f64::from(total) * 100.0)
    }

    /// Whether the target matches a forbidden-target pattern
    ///
    /// Patterns match the name, the identifier, or `namespace/name`.
    pub fn matches(&self, pattern: &str) -> bool {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return false;
        }
        if self.name == pattern || self.identifier == pattern {
            return true;
        }
        self.namespace
            .as_deref()
            .is_some_and(|ns| format!("{ns}/{}", self.name) == pattern)
    }
}
