//! Scheduling priority value object

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scheduling priority of a queued experiment
///
/// Higher priorities are admitted first; equal priorities keep FIFO order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Run before everything else in the queue
    High,
    /// Regular experiments
    #[default]
    Medium,
    /// Background experiments that can wait
    Low,
}

impl Priority {
    /// Numeric rank, larger is more urgent
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
        }
    }

    /// Get a human-readable label
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Check if this priority is higher than another
    #[must_use]
    pub const fn is_higher_than(&self, other: &Self) -> bool {
        self.rank() > other.rank()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}
