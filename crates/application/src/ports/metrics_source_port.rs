//! Metrics source port

use std::collections::BTreeMap;

use async_trait::async_trait;
use domain::entities::Target;
#[cfg(test)]
use mockall::automock;

use crate::error::ApplicationError;

/// Source of numeric samples (error rate, latency percentiles, throughput)
/// observed on a target
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MetricsSourcePort: Send + Sync {
    /// Take one sample of every metric available for the target
    async fn sample(&self, target: &Target) -> Result<BTreeMap<String, f64>, ApplicationError>;
}
