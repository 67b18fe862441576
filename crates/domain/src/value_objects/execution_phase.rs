//! Execution phases inside a running experiment

use std::fmt;

use serde::{Deserialize, Serialize};

/// Phase of a running experiment, in strict execution order
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    /// Resolve injectors and health checks, capture the baseline
    Preparation,
    /// Inject every enabled fault
    Injection,
    /// Record observations for the experiment window
    Observation,
    /// Remove faults and poll health checks until recovered
    Recovery,
    /// Evaluate the hypothesis and compute impact
    Validation,
    /// Force-remove anything still active and release resources
    Cleanup,
}

impl ExecutionPhase {
    /// All phases in execution order
    pub const fn all() -> [Self; 6] {
        [
            Self::Preparation,
            Self::Injection,
            Self::Observation,
            Self::Recovery,
            Self::Validation,
            Self::Cleanup,
        ]
    }

    /// The phase that follows this one, if any
    pub const fn next(&self) -> Option<Self> {
        match self {
            Self::Preparation => Some(Self::Injection),
            Self::Injection => Some(Self::Observation),
            Self::Observation => Some(Self::Recovery),
            Self::Recovery => Some(Self::Validation),
            Self::Validation => Some(Self::Cleanup),
            Self::Cleanup => None,
        }
    }

    /// Zero-based position in the phase order
    pub const fn index(&self) -> usize {
        match self {
            Self::Preparation => 0,
            Self::Injection => 1,
            Self::Observation => 2,
            Self::Recovery => 3,
            Self::Validation => 4,
            Self::Cleanup => 5,
        }
    }

    /// Lowercase label
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Preparation => "preparation",
            Self::Injection => "injection",
            Self::Observation => "observation",
            Self::Recovery => "recovery",
            Self::Validation => "validation",
            Self::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
