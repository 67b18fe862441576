//! Chaos orchestrator
//!
//! The externally exposed operations: create, run, monitor and stop
//! experiments, check them against a policy, report on results and fan them
//! out over regions. Owns the experiment registry and the event channel and
//! shares both with the executor.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use domain::entities::{Experiment, ExperimentResults, PolicyViolation, SafetyPolicy};
use domain::value_objects::{ExperimentId, ExperimentStatus};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::cancellation::CancellationToken;
use crate::error::ApplicationError;
use crate::ports::{
    ExperimentQuery, ExperimentStorePort, RegionRunner, ReportSinkPort, ResilienceReport,
};
use crate::services::coordinator::{
    CoordinationPolicy, DistributedCoordinator, DistributedResults, RegionPlan,
};
use crate::services::events::{EventPublisher, ExperimentEvent, ExperimentEventKind};
use crate::services::executor::ExperimentExecutor;
use crate::services::registry::{ExperimentProgress, ExperimentRegistry};
use crate::services::resilience_scorer::build_report;
use crate::services::safety_policy::{AdmissionDecision, SafetyPolicyEngine};
use crate::services::scheduler::{ExperimentScheduler, SchedulerConfig};

/// Entry point for running chaos experiments
pub struct ChaosOrchestrator {
    executor: ExperimentExecutor,
    scheduler: ExperimentScheduler,
    registry: Arc<ExperimentRegistry>,
    policy: Arc<SafetyPolicyEngine>,
    events: EventPublisher,
    store: Option<Arc<dyn ExperimentStorePort>>,
    report_sink: Option<Arc<dyn ReportSinkPort>>,
}

impl std::fmt::Debug for ChaosOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaosOrchestrator")
            .field("executor", &self.executor)
            .field("scheduler", &self.scheduler)
            .field("has_store", &self.store.is_some())
            .field("has_report_sink", &self.report_sink.is_some())
            .finish_non_exhaustive()
    }
}

impl ChaosOrchestrator {
    /// Build an orchestrator around a configured executor
    ///
    /// The executor's safety policy is shared with the scheduler.
    #[must_use]
    pub fn new(executor: ExperimentExecutor, scheduler: SchedulerConfig) -> Self {
        let registry = Arc::new(ExperimentRegistry::new());
        let events = EventPublisher::default();
        let policy = Arc::new(executor.policy().clone());
        let executor = executor
            .with_registry(Arc::clone(&registry))
            .with_events(events.clone());
        Self {
            executor,
            scheduler: ExperimentScheduler::new(scheduler, Arc::clone(&policy)),
            registry,
            policy,
            events,
            store: None,
            report_sink: None,
        }
    }

    /// Persist experiments and results through this store
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ExperimentStorePort>) -> Self {
        self.store = Some(store);
        self
    }

    /// Hand every finished run's report to this sink
    #[must_use]
    pub fn with_report_sink(mut self, sink: Arc<dyn ReportSinkPort>) -> Self {
        self.report_sink = Some(sink);
        self
    }

    pub fn registry(&self) -> &ExperimentRegistry {
        &self.registry
    }

    pub const fn scheduler(&self) -> &ExperimentScheduler {
        &self.scheduler
    }

    /// Receive lifecycle events for every experiment
    pub fn subscribe(&self) -> broadcast::Receiver<ExperimentEvent> {
        self.events.subscribe()
    }

    /// Validate and register an experiment
    ///
    /// Structural problems are reported before policy violations. Deny
    /// violations, and approval violations without an approver, reject the
    /// experiment; log and alert violations are only logged.
    #[instrument(skip(self, experiment), fields(experiment_id = %experiment.id, name = %experiment.name))]
    pub async fn create_experiment(
        &self,
        experiment: Experiment,
    ) -> Result<ExperimentId, ApplicationError> {
        self.register(experiment, CancellationToken::new()).await
    }

    async fn register(
        &self,
        experiment: Experiment,
        cancel: CancellationToken,
    ) -> Result<ExperimentId, ApplicationError> {
        experiment.validate()?;

        match self.policy.admission(&experiment) {
            AdmissionDecision::Admit { warnings } => {
                for warning in &warnings {
                    warn!(rule = %warning.rule, action = ?warning.action, message = %warning.message, "Policy warning");
                }
            },
            decision => {
                return Err(ApplicationError::Validation(format!(
                    "experiment '{}' violates safety policy: {}",
                    experiment.name,
                    decision.summary()
                )));
            },
        }

        if self.registry.contains(&experiment.id) {
            return Err(ApplicationError::Validation(format!(
                "experiment '{}' already exists",
                experiment.id
            )));
        }
        if let Some(store) = &self.store {
            store.save(&experiment).await?;
        }

        let id = experiment.id.clone();
        self.registry.insert_with_token(experiment, cancel)?;
        self.events.publish(&id, ExperimentEventKind::Created);
        info!("Experiment created");
        Ok(id)
    }

    /// Admit and execute a registered experiment
    ///
    /// Waits for a scheduler slot (or is rejected, depending on the admission
    /// mode). Once admitted the call always returns results, whatever happened
    /// during the run.
    #[instrument(skip(self), fields(experiment_id = %id))]
    pub async fn run_experiment(
        &self,
        id: &ExperimentId,
    ) -> Result<ExperimentResults, ApplicationError> {
        let experiment = self.find(id).await?;
        let cancel = self
            .registry
            .cancel_token(id)
            .ok_or_else(|| ApplicationError::NotFound(format!("experiment '{id}'")))?;

        match experiment.status {
            ExperimentStatus::Pending => {},
            ExperimentStatus::Aborted => {
                return Err(ApplicationError::Aborted(format!(
                    "experiment '{id}' was stopped before it started"
                )));
            },
            status => {
                return Err(ApplicationError::Validation(format!(
                    "experiment '{id}' is already {status}"
                )));
            },
        }

        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(ApplicationError::Aborted(format!(
                    "experiment '{id}' was stopped while queued"
                )));
            },
            admitted = self.scheduler.admit(&experiment) => admitted?,
        };

        let results = self.executor.execute(experiment, &cancel).await;
        drop(permit);
        let results = results?;

        let finished = self.registry.get(id);
        if let (Some(store), Some(finished)) = (&self.store, &finished) {
            if let Err(e) = store.save(finished).await {
                warn!(error = %e, "Failed to persist experiment results");
            }
        }
        if let Some(finished) = &finished {
            self.publish_report(finished, &results).await;
        }
        Ok(results)
    }

    /// Current status and progress of an experiment
    pub fn monitor_experiment(
        &self,
        id: &ExperimentId,
    ) -> Result<ExperimentProgress, ApplicationError> {
        self.registry
            .progress(id)
            .ok_or_else(|| ApplicationError::NotFound(format!("experiment '{id}'")))
    }

    /// Stop an experiment
    ///
    /// A pending experiment is aborted right away. A running one is
    /// cancelled; the executor removes its faults and finishes it as
    /// aborted. Stopping a finished experiment is an error.
    #[instrument(skip(self), fields(experiment_id = %id))]
    pub fn stop_experiment(&self, id: &ExperimentId) -> Result<(), ApplicationError> {
        let experiment = self
            .registry
            .get(id)
            .ok_or_else(|| ApplicationError::NotFound(format!("experiment '{id}'")))?;
        let cancel = self
            .registry
            .cancel_token(id)
            .ok_or_else(|| ApplicationError::NotFound(format!("experiment '{id}'")))?;

        match experiment.status {
            ExperimentStatus::Pending => {
                cancel.cancel();
                self.registry.transition(id, ExperimentStatus::Aborted)?;
                self.events.publish(
                    id,
                    ExperimentEventKind::Finished {
                        status: ExperimentStatus::Aborted,
                    },
                );
                info!("Pending experiment aborted");
                Ok(())
            },
            ExperimentStatus::Running => {
                cancel.cancel();
                info!("Cancellation requested");
                Ok(())
            },
            status => Err(ApplicationError::Validation(format!(
                "experiment '{id}' is already {status}"
            ))),
        }
    }

    /// Check an experiment against any policy, without side effects
    pub fn validate_policy(
        &self,
        experiment: &Experiment,
        policy: &SafetyPolicy,
    ) -> Vec<PolicyViolation> {
        SafetyPolicyEngine::evaluate(experiment, policy, Utc::now())
    }

    /// Report for a finished experiment
    pub async fn report(&self, id: &ExperimentId) -> Result<ResilienceReport, ApplicationError> {
        let experiment = self.find(id).await?;
        let results = experiment.results.as_ref().ok_or_else(|| {
            ApplicationError::NotFound(format!("results for experiment '{id}'"))
        })?;
        Ok(build_report(&experiment, results))
    }

    /// Build a report from explicit results and hand it to the sink
    pub async fn report_results(
        &self,
        experiment: &Experiment,
        results: &ExperimentResults,
    ) -> ResilienceReport {
        self.publish_report(experiment, results).await
    }

    async fn publish_report(
        &self,
        experiment: &Experiment,
        results: &ExperimentResults,
    ) -> ResilienceReport {
        let report = build_report(experiment, results);
        if let Some(sink) = &self.report_sink {
            if let Err(e) = sink.publish(&report).await {
                warn!(experiment_id = %experiment.id, error = %e, "Failed to publish report");
            }
        }
        report
    }

    /// Experiments known to this instance, oldest first
    pub fn list_experiments(&self) -> Vec<Experiment> {
        self.registry.list()
    }

    /// Forget terminal experiments, regional copies included, that finished
    /// more than `retention` ago; persisted records are kept
    pub fn prune_finished(&self, retention: std::time::Duration) -> usize {
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(retention)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
        let pruned = self.registry.prune_terminal(cutoff);
        if pruned > 0 {
            debug!(pruned, "Pruned finished experiments");
        }
        pruned
    }

    /// Persisted experiments matching `query`; falls back to the registry
    pub async fn history(
        &self,
        query: &ExperimentQuery,
    ) -> Result<Vec<Experiment>, ApplicationError> {
        if let Some(store) = &self.store {
            return store.list(query).await;
        }
        let mut experiments: Vec<_> = self
            .registry
            .list()
            .into_iter()
            .filter(|e| query.status.is_none_or(|s| e.status == s))
            .filter(|e| query.tag.as_ref().is_none_or(|t| e.tags.contains(t)))
            .collect();
        experiments.reverse();
        if let Some(limit) = query.limit {
            experiments.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        Ok(experiments)
    }

    /// Run a registered experiment in several regions
    ///
    /// Each region gets its own registered copy of the experiment; stopping
    /// the original cancels every regional run.
    #[instrument(skip(self, regions), fields(experiment_id = %id, mode = %policy.mode))]
    pub async fn run_distributed(
        self: &Arc<Self>,
        id: &ExperimentId,
        regions: &[RegionPlan],
        policy: &CoordinationPolicy,
    ) -> Result<DistributedResults, ApplicationError> {
        let experiment = self.find(id).await?;
        let cancel = self.registry.cancel_token(id).unwrap_or_default();
        let runner: Arc<dyn RegionRunner> = Arc::clone(self) as Arc<dyn RegionRunner>;
        DistributedCoordinator::new(runner)
            .run(&experiment, regions, policy, &cancel)
            .await
    }

    /// Registry first, then the store
    async fn find(&self, id: &ExperimentId) -> Result<Experiment, ApplicationError> {
        if let Some(experiment) = self.registry.get(id) {
            return Ok(experiment);
        }
        if let Some(store) = &self.store {
            if let Some(experiment) = store.get(id).await? {
                debug!(experiment_id = %id, "Loaded experiment from store");
                return Ok(experiment);
            }
        }
        Err(ApplicationError::NotFound(format!("experiment '{id}'")))
    }
}

#[async_trait]
impl RegionRunner for ChaosOrchestrator {
    async fn run_in_region(
        &self,
        region: &str,
        experiment: Experiment,
        cancel: CancellationToken,
    ) -> Result<ExperimentResults, ApplicationError> {
        debug!(region, experiment_id = %experiment.id, "Starting regional run");
        let id = self.register(experiment, cancel).await?;
        self.run_experiment(&id).await
    }
}
