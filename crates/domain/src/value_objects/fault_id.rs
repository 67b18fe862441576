//! Fault identifier

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a fault definition within an experiment
///
/// Injectors key their active-fault tables by this id, so re-injecting the
/// same id updates the existing entry instead of adding a second one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaultId(String);

impl FaultId {
    /// Wrap an existing identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new random identifier
    pub fn generate() -> Self {
        Self(format!("fault-{}", Uuid::new_v4()))
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

impl Default for FaultId {
    fn default() -> Self {
        Self::generate()
    }
}

impl fmt::Display for FaultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FaultId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
