//! Experiment identifier

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a chaos experiment
///
/// Experiments are usually submitted from definition files that carry their
/// own id, so the identifier is an opaque string. [`ExperimentId::generate`]
/// produces a random UUID-based id for programmatically created experiments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperimentId(String);

impl ExperimentId {
    /// Wrap an existing identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new random identifier
    pub fn generate() -> Self {
        Self(format!("exp-{}", Uuid::new_v4()))
    }

    /// Whether the identifier is blank
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ExperimentId {
    fn default() -> Self {
        Self::generate()
    }
}

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExperimentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ExperimentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(ExperimentId::generate(), ExperimentId::generate());
    }

    #[test]
    fn generated_id_has_prefix() {
        assert!(ExperimentId::generate().as_str().starts_with("exp-"));
    }

    #[test]
    fn blank_id_is_empty() {
        assert!(ExperimentId::new("").is_empty());
        assert!(ExperimentId::new("   ").is_empty());
        assert!(!ExperimentId::new("exp-1").is_empty());
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = ExperimentId::new("exp-42");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"exp-42\"");
        let back: ExperimentId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
