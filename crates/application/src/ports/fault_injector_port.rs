//! Fault injector port
//!
//! One contract for every fault category. Adapters own their active-fault
//! table and talk to whatever actually perturbs the system.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::entities::{FaultDefinition, Target};
use domain::value_objects::ExperimentId;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::ApplicationError;

/// Current state of a fault on a target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FaultStatus {
    pub active: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed: Duration,
    /// Time left until the fault's own duration runs out
    pub remaining: Duration,
}

impl FaultStatus {
    /// Status of a fault that is not injected
    #[must_use]
    pub fn inactive() -> Self {
        Self::default()
    }
}

/// Port for injecting and removing faults
///
/// Contract:
/// - `inject` is idempotent per (experiment, fault id); re-injecting updates
///   the existing entry instead of adding a second one
/// - `remove` on an unknown or inactive fault is a no-op
/// - `status` on an unknown fault returns an inactive status, never an error
/// - only backend communication failures are errors
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FaultInjectorPort: Send + Sync {
    /// Apply the fault to the target
    async fn inject(
        &self,
        experiment_id: &ExperimentId,
        fault: &FaultDefinition,
        target: &Target,
    ) -> Result<(), ApplicationError>;

    /// Lift the fault from the target
    async fn remove(
        &self,
        experiment_id: &ExperimentId,
        fault: &FaultDefinition,
        target: &Target,
    ) -> Result<(), ApplicationError>;

    /// Report whether the fault is active
    async fn status(
        &self,
        experiment_id: &ExperimentId,
        fault: &FaultDefinition,
        target: &Target,
    ) -> Result<FaultStatus, ApplicationError>;
}
