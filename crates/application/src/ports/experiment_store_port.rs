//! Experiment storage port
//!
//! Persists experiments together with their results. Records must round-trip
//! every field, timestamps and durations included.

use async_trait::async_trait;
use domain::entities::Experiment;
use domain::value_objects::{ExperimentId, ExperimentStatus};
#[cfg(test)]
use mockall::automock;

use crate::error::ApplicationError;

/// Query options for listing stored experiments
#[derive(Debug, Clone, Default)]
pub struct ExperimentQuery {
    /// Filter by status
    pub status: Option<ExperimentStatus>,
    /// Filter by tag
    pub tag: Option<String>,
    /// Maximum number of results, newest first
    pub limit: Option<u32>,
}

impl ExperimentQuery {
    /// Set status filter
    #[must_use]
    pub const fn with_status(mut self, status: ExperimentStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set tag filter
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Set limit
    #[must_use]
    pub const fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Port for experiment persistence
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ExperimentStorePort: Send + Sync {
    /// Insert or replace an experiment
    async fn save(&self, experiment: &Experiment) -> Result<(), ApplicationError>;

    /// Load an experiment by id
    async fn get(&self, id: &ExperimentId) -> Result<Option<Experiment>, ApplicationError>;

    /// List experiments matching the query
    async fn list(&self, query: &ExperimentQuery) -> Result<Vec<Experiment>, ApplicationError>;

    /// Delete an experiment, returning whether it existed
    async fn delete(&self, id: &ExperimentId) -> Result<bool, ApplicationError>;
}
