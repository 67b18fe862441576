//! Application-level errors

use std::time::Duration;

use domain::DomainError;
use thiserror::Error;

/// Errors that can occur in the application layer
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// Domain-level error
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Structural or policy violation; the experiment never runs
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A fault injector failed
    #[error("Injection failed for fault {fault_id}: {message}")]
    Injection { fault_id: String, message: String },

    /// Health checks did not pass before the recovery deadline
    #[error("Recovery timed out after {elapsed:?}: {message}")]
    RecoveryTimeout { elapsed: Duration, message: String },

    /// The scheduler refused to admit the experiment
    #[error("Scheduler rejected experiment: {0}")]
    SchedulerRejection(String),

    /// The experiment was cancelled
    #[error("Experiment aborted: {0}")]
    Aborted(String),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Infrastructure communication failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApplicationError {
    /// Create an injection error
    pub fn injection(fault_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Injection {
            fault_id: fault_id.into(),
            message: message.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Only infrastructure communication failures are worth retrying.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(_))
    }

    /// Whether this error was raised before the experiment ran
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::SchedulerRejection(_) | Self::Domain(_)
        )
    }
}
