//! Report sink port
//!
//! Receives finished resilience reports. Rendering and export are up to the
//! adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::entities::{BlastRadius, ExperimentResults};
use domain::value_objects::ExperimentId;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::ApplicationError;

/// Score, blast radius and results of one finished experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResilienceReport {
    pub experiment_id: ExperimentId,
    pub experiment_name: String,
    /// 0-100
    pub score: u8,
    pub blast_radius: BlastRadius,
    pub results: ExperimentResults,
    pub generated_at: DateTime<Utc>,
}

/// Port for publishing reports
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReportSinkPort: Send + Sync {
    async fn publish(&self, report: &ResilienceReport) -> Result<(), ApplicationError>;
}
