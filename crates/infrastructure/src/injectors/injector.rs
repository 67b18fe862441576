//! Backend-driven fault injector

use std::sync::Arc;

use application::ApplicationError;
use application::ports::{FaultInjectorPort, FaultStatus};
use async_trait::async_trait;
use domain::entities::{FaultCategory, FaultDefinition, Target};
use domain::value_objects::ExperimentId;
use tracing::{debug, info, instrument, warn};

use super::active_faults::ActiveFaultTable;
use super::backend::{BackendError, FaultBackend};
use super::effects::{EffectHandle, FaultEffect};
use crate::retry::{RetryConfig, Retryable, retry};

/// Injector for one fault category over a [`FaultBackend`]
///
/// Owns its active-fault table. Backend calls are retried per `retry`.
#[derive(Debug)]
pub struct BackendInjector {
    category: FaultCategory,
    backend: Arc<dyn FaultBackend>,
    table: ActiveFaultTable,
    retry: RetryConfig,
}

impl BackendInjector {
    pub fn new(category: FaultCategory, backend: Arc<dyn FaultBackend>, retry: RetryConfig) -> Self {
        Self {
            category,
            backend,
            table: ActiveFaultTable::new(),
            retry,
        }
    }

    pub const fn category(&self) -> FaultCategory {
        self.category
    }

    pub const fn active_faults(&self) -> &ActiveFaultTable {
        &self.table
    }

    fn check_category(&self, fault: &FaultDefinition) -> Result<(), ApplicationError> {
        if fault.category() == self.category {
            Ok(())
        } else {
            Err(ApplicationError::injection(
                fault.id.as_str(),
                format!(
                    "{} injector cannot handle {} fault '{}'",
                    self.category,
                    fault.category(),
                    fault.type_name()
                ),
            ))
        }
    }

    fn map_error(&self, fault: &FaultDefinition, err: &BackendError) -> ApplicationError {
        if err.is_retryable() {
            ApplicationError::Backend(format!("{} backend: {err}", self.backend.name()))
        } else {
            ApplicationError::injection(fault.id.as_str(), err.to_string())
        }
    }
}

#[async_trait]
impl FaultInjectorPort for BackendInjector {
    #[instrument(skip(self, fault, target), fields(category = %self.category, fault_id = %fault.id, target = %target.name))]
    async fn inject(
        &self,
        experiment_id: &ExperimentId,
        fault: &FaultDefinition,
        target: &Target,
    ) -> Result<(), ApplicationError> {
        self.check_category(fault)?;

        let handle = EffectHandle::new(experiment_id, &fault.id);
        let effect = FaultEffect::from_config(&fault.config);

        retry(&self.retry, || self.backend.apply(&handle, target, &effect))
            .await
            .map_err(|e| self.map_error(fault, &e))?;

        let replaced = self
            .table
            .insert(handle, effect, target.name.clone(), fault.duration);
        if replaced {
            debug!("fault re-injected, entry updated");
        } else {
            info!(fault_type = fault.type_name(), "fault injected");
        }
        Ok(())
    }

    #[instrument(skip(self, fault, target), fields(category = %self.category, fault_id = %fault.id))]
    async fn remove(
        &self,
        experiment_id: &ExperimentId,
        fault: &FaultDefinition,
        target: &Target,
    ) -> Result<(), ApplicationError> {
        let handle = EffectHandle::new(experiment_id, &fault.id);
        if !self.table.contains(&handle) {
            debug!("fault not active, nothing to remove");
            return Ok(());
        }

        match retry(&self.retry, || self.backend.revert(&handle, target)).await {
            Ok(()) => {
                self.table.remove(&handle);
                info!("fault removed");
                Ok(())
            },
            Err(e) => {
                warn!(error = %e, "fault removal failed, fault still active");
                Err(self.map_error(fault, &e))
            },
        }
    }

    async fn status(
        &self,
        experiment_id: &ExperimentId,
        fault: &FaultDefinition,
        _target: &Target,
    ) -> Result<FaultStatus, ApplicationError> {
        Ok(self.table.status(&EffectHandle::new(experiment_id, &fault.id)))
    }
}
