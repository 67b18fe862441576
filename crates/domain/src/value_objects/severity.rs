//! Severity value object

use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity shared by faults, failures, observations and policy rules
///
/// Variants are declared in ascending order so that `Ord` compares by
/// seriousness (`Low < Medium < High < Critical`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational, negligible impact
    #[default]
    Low,
    /// Noticeable but contained impact
    Medium,
    /// Significant impact on a service
    High,
    /// Impact that invalidates the experiment hypothesis
    Critical,
}

impl Severity {
    /// Get a human-readable label
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Whether this is the `Critical` level
    #[must_use]
    pub const fn is_critical(&self) -> bool {
        matches!(self, Self::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
