//! Health check port
//!
//! Health checks are registered by name and polled during recovery.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::error::ApplicationError;

/// A single health probe
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HealthCheckPort: Send + Sync {
    /// Succeeds when the checked component is healthy
    async fn check(&self) -> Result<(), ApplicationError>;
}
