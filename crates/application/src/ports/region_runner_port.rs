//! Region runner port
//!
//! Runs one experiment in one named region. The distributed coordinator
//! fans out over this port.

use async_trait::async_trait;
use domain::entities::{Experiment, ExperimentResults};
#[cfg(test)]
use mockall::automock;

use crate::cancellation::CancellationToken;
use crate::error::ApplicationError;

/// Port for running an experiment in a region
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RegionRunner: Send + Sync {
    /// Run the experiment in `region`, honoring `cancel`
    ///
    /// An `Err` means the run never started in that region; failures during
    /// the run are recorded in the returned results.
    async fn run_in_region(
        &self,
        region: &str,
        experiment: Experiment,
        cancel: CancellationToken,
    ) -> Result<ExperimentResults, ApplicationError>;
}
