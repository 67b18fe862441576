//! Experiment lifecycle status

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of an experiment
///
/// Status only moves forward: `Pending -> Running -> {Completed, Failed, Aborted}`.
/// A pending experiment may also be aborted before it ever runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    /// Created and validated, waiting for admission
    #[default]
    Pending,
    /// Admitted and executing phases
    Running,
    /// All phases finished
    Completed,
    /// Finished, but the run itself failed (e.g. every injection failed)
    Failed,
    /// Cancelled externally; cleanup was forced
    Aborted,
}

impl ExperimentStatus {
    /// Check if this is a terminal state (no further changes possible)
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }

    /// Check whether moving to `next` keeps the lifecycle monotonic
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running | Self::Aborted)
                | (Self::Running, Self::Completed | Self::Failed | Self::Aborted)
        )
    }

    /// Get a lowercase label
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for ExperimentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "aborted" => Ok(Self::Aborted),
            other => Err(format!("Unknown experiment status: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ExperimentStatus; 5] = [
        ExperimentStatus::Pending,
        ExperimentStatus::Running,
        ExperimentStatus::Completed,
        ExperimentStatus::Failed,
        ExperimentStatus::Aborted,
    ];

    #[test]
    fn forward_transitions_are_allowed() {
        assert!(ExperimentStatus::Pending.can_transition_to(ExperimentStatus::Running));
        assert!(ExperimentStatus::Pending.can_transition_to(ExperimentStatus::Aborted));
        assert!(ExperimentStatus::Running.can_transition_to(ExperimentStatus::Completed));
        assert!(ExperimentStatus::Running.can_transition_to(ExperimentStatus::Failed));
        assert!(ExperimentStatus::Running.can_transition_to(ExperimentStatus::Aborted));
    }

    #[test]
    fn terminal_states_never_move() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn running_cannot_regress_to_pending() {
        assert!(!ExperimentStatus::Running.can_transition_to(ExperimentStatus::Pending));
    }

    #[test]
    fn pending_cannot_complete_without_running() {
        assert!(!ExperimentStatus::Pending.can_transition_to(ExperimentStatus::Completed));
    }

    #[test]
    fn parses_from_label() {
        for status in ALL {
            assert_eq!(status.label().parse::<ExperimentStatus>(), Ok(status));
        }
        assert!("unknown".parse::<ExperimentStatus>().is_err());
    }
}
