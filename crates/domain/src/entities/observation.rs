//! Observations recorded while an experiment runs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::Severity;

/// Kind of observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationKind {
    Metric,
    Log,
    Event,
    Health,
}

/// A timestamped record of system behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub kind: ObservationKind,
    #[serde(default)]
    pub severity: Severity,
    /// Arbitrary payload; numeric fields feed the impact summary
    #[serde(default)]
    pub data: BTreeMap<String, serde_json::Value>,
}

impl Observation {
    pub fn new(kind: ObservationKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            severity: Severity::Low,
            data: BTreeMap::new(),
        }
    }

    /// Metric snapshot from a map of numeric samples
    pub fn metrics(samples: &BTreeMap<String, f64>) -> Self {
        let mut observation = Self::new(ObservationKind::Metric);
        for (name, value) in samples {
            observation
                .data
                .insert(name.clone(), serde_json::Value::from(*value));
        }
        observation
    }

    /// Event with a message
    pub fn event(message: impl Into<String>) -> Self {
        Self::new(ObservationKind::Event).with_field("message", message.into())
    }

    /// Health-check result
    pub fn health(check: impl Into<String>, healthy: bool) -> Self {
        let severity = if healthy {
            Severity::Low
        } else {
            Severity::High
        };
        Self::new(ObservationKind::Health)
            .with_field("check", check.into())
            .with_field("healthy", healthy)
            .with_severity(severity)
    }

    #[must_use]
    pub const fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Numeric fields of the payload
    pub fn numeric_fields(&self) -> impl Iterator<Item = (&str, f64)> {
        self.data
            .iter()
            .filter_map(|(k, v)| v.as_f64().map(|n| (k.as_str(), n)))
    }
}
