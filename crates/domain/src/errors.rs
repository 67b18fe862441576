//! Domain-level errors

use thiserror::Error;

use crate::value_objects::ExperimentStatus;

/// Errors that can occur in the domain layer
#[derive(Debug, Error)]
pub enum DomainError {
    /// Structural validation failed
    #[error("Validation failed: {0}")]
    ValidationError(String),

    /// A fault definition carries parameters outside their allowed range
    #[error("Invalid fault configuration: {0}")]
    InvalidFaultConfig(String),

    /// Experiment status would regress or skip a required state
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: ExperimentStatus,
        to: ExperimentStatus,
    },

    /// Entity not found
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },
}

impl DomainError {
    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }
}
