//! Experiment executor
//!
//! Drives one experiment through its phases:
//!
//! ```text
//! Preparation -> Injection -> Observation -> Recovery -> Validation -> Cleanup
//! ```
//!
//! Injection, removal and recovery problems are recorded inside the returned
//! [`ExperimentResults`]; only validation and lifecycle errors are returned as
//! `Err`. Cleanup always runs and force-removes every fault that is still
//! active, whatever happened before.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use domain::entities::{
    Experiment, ExperimentResults, Failure, FailureKind, FaultDefinition, InjectionFailurePolicy,
    Observation, RecoveryConfig, RecoveryResult,
};
use domain::value_objects::{ExecutionPhase, ExperimentStatus, Severity};
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, MissedTickBehavior, interval, sleep, sleep_until};
use tracing::{debug, info, instrument, warn};

use crate::cancellation::CancellationToken;
use crate::error::ApplicationError;
use crate::ports::{FaultInjectorPort, MetricsSourcePort};
use crate::services::events::{EventPublisher, ExperimentEventKind};
use crate::services::injector_registry::InjectorRegistry;
use crate::services::recovery_validator::RecoveryValidator;
use crate::services::registry::ExperimentRegistry;
use crate::services::safety_policy::SafetyPolicyEngine;

/// Executor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Time between metric samples during observation
    #[serde(default = "default_monitoring_interval")]
    pub monitoring_interval: Duration,
    /// Timeout for experiments that do not set one
    #[serde(default = "default_timeout")]
    pub default_timeout: Duration,
    /// Overrides the experiments' own injection failure policy when set
    #[serde(default)]
    pub failure_policy: Option<InjectionFailurePolicy>,
}

/// Shortest monitoring interval the executor accepts
pub const MIN_MONITORING_INTERVAL: Duration = Duration::from_millis(10);

const fn default_monitoring_interval() -> Duration {
    Duration::from_secs(10)
}

const fn default_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            monitoring_interval: default_monitoring_interval(),
            default_timeout: default_timeout(),
            failure_policy: None,
        }
    }
}

impl ExecutorConfig {
    /// Raise a zero or tiny monitoring interval to the minimum
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.monitoring_interval < MIN_MONITORING_INTERVAL {
            warn!(
                configured_ms = u64::try_from(self.monitoring_interval.as_millis()).unwrap_or(u64::MAX),
                "Monitoring interval too small, using minimum"
            );
            self.monitoring_interval = MIN_MONITORING_INTERVAL;
        }
        self
    }
}

type Sampler = Arc<dyn Fn() -> f64 + Send + Sync>;

struct ActiveFault {
    fault: FaultDefinition,
    injector: Arc<dyn FaultInjectorPort>,
    /// When the fault must be removed at the latest
    remove_at: Instant,
    removed: bool,
}

struct Run<'a> {
    experiment: &'a Experiment,
    results: ExperimentResults,
    active: Vec<ActiveFault>,
    timeout: Duration,
    deadline: Instant,
}

impl Run<'_> {
    fn next_expiry(&self) -> Option<Instant> {
        self.active
            .iter()
            .filter(|a| !a.removed)
            .map(|a| a.remove_at)
            .min()
    }

    fn pending_removals(&self) -> Vec<usize> {
        (0..self.active.len())
            .filter(|i| !self.active[*i].removed)
            .collect()
    }

    fn fail(&mut self, failure: Failure) {
        self.results.record_failure(failure);
    }
}

#[derive(Debug, Default)]
struct InjectionOutcome {
    attempted: usize,
    injected: usize,
    stopped_by_policy: bool,
    cancelled: bool,
}

enum Wake {
    Cancelled,
    Tick,
    Expiry,
}

/// Runs experiments phase by phase
pub struct ExperimentExecutor {
    injectors: InjectorRegistry,
    recovery: RecoveryValidator,
    policy: SafetyPolicyEngine,
    metrics_source: Option<Arc<dyn MetricsSourcePort>>,
    registry: Arc<ExperimentRegistry>,
    events: EventPublisher,
    config: ExecutorConfig,
    sampler: Sampler,
}

impl std::fmt::Debug for ExperimentExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExperimentExecutor")
            .field("injectors", &self.injectors)
            .field("recovery", &self.recovery)
            .field("config", &self.config)
            .field("has_metrics_source", &self.metrics_source.is_some())
            .finish_non_exhaustive()
    }
}

impl ExperimentExecutor {
    #[must_use]
    pub fn new(
        injectors: InjectorRegistry,
        recovery: RecoveryValidator,
        policy: SafetyPolicyEngine,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            injectors,
            recovery,
            policy,
            metrics_source: None,
            registry: Arc::new(ExperimentRegistry::new()),
            events: EventPublisher::default(),
            config: config.normalized(),
            sampler: Arc::new(rand::random::<f64>),
        }
    }

    /// Share a registry for status and progress bookkeeping
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<ExperimentRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Publish lifecycle events through this publisher
    #[must_use]
    pub fn with_events(mut self, events: EventPublisher) -> Self {
        self.events = events;
        self
    }

    /// Sample metrics from this source during observation
    #[must_use]
    pub fn with_metrics_source(mut self, source: Arc<dyn MetricsSourcePort>) -> Self {
        self.metrics_source = Some(source);
        self
    }

    /// Replace the random source used for fault probabilities
    #[must_use]
    pub fn with_sampler(mut self, sampler: impl Fn() -> f64 + Send + Sync + 'static) -> Self {
        self.sampler = Arc::new(sampler);
        self
    }

    pub const fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub const fn policy(&self) -> &SafetyPolicyEngine {
        &self.policy
    }

    /// Pre-run validation: structure first, then forbidden targets
    pub fn validate(&self, experiment: &Experiment) -> Result<(), ApplicationError> {
        experiment.validate()?;
        self.policy.check_forbidden_target(experiment)
    }

    /// Run an experiment to a terminal status
    ///
    /// Returns `Err` only when the experiment fails validation or cannot be
    /// started; everything after that is reported in the results.
    #[instrument(skip(self, experiment, cancel), fields(experiment_id = %experiment.id, faults = experiment.faults.len()))]
    pub async fn execute(
        &self,
        mut experiment: Experiment,
        cancel: &CancellationToken,
    ) -> Result<ExperimentResults, ApplicationError> {
        self.validate(&experiment)?;

        let id = experiment.id.clone();
        self.registry
            .transition(&id, ExperimentStatus::Running)
            .map_err(|e| ApplicationError::Aborted(format!("experiment '{id}' cannot start: {e}")))?;
        experiment.transition_to(ExperimentStatus::Running)?;

        metrics::counter!("chaos_experiments_started_total").increment(1);
        self.events.publish(&id, ExperimentEventKind::Started);
        info!(target_name = %experiment.target.name, dry_run = experiment.dry_run, "Experiment started");

        let timeout = experiment.effective_timeout(self.config.default_timeout);
        let mut run = Run {
            experiment: &experiment,
            results: ExperimentResults::started(Utc::now()),
            active: Vec::new(),
            timeout,
            deadline: instant_after(timeout),
        };
        run.results.dry_run = experiment.dry_run;

        let status = self.drive(&mut run, cancel).await;

        self.enter_phase(&run, ExecutionPhase::Cleanup);
        self.cleanup(&mut run).await;
        self.finish_phase(&mut run, ExecutionPhase::Cleanup);

        let mut results = run.results;
        results.finish(status, Utc::now());
        results.recommendations = recommendations(&results);

        if let Err(e) = self.registry.complete(&id, &results) {
            warn!(error = %e, "Could not record results in registry");
        }
        metrics::counter!("chaos_experiments_finished_total", "status" => status.label())
            .increment(1);
        self.events
            .publish(&id, ExperimentEventKind::Finished { status });
        info!(
            status = %status,
            failures = results.failures.len(),
            hypothesis_valid = results.hypothesis_valid,
            duration_ms = u64::try_from(results.duration.as_millis()).unwrap_or(u64::MAX),
            "Experiment finished"
        );

        Ok(results)
    }

    /// Phases up to and including Validation; returns the terminal status
    async fn drive(&self, run: &mut Run<'_>, cancel: &CancellationToken) -> ExperimentStatus {
        self.enter_phase(run, ExecutionPhase::Preparation);
        if cancel.is_cancelled() {
            return self.abort(run, ExecutionPhase::Preparation).await;
        }
        self.prepare(run).await;
        self.finish_phase(run, ExecutionPhase::Preparation);

        if cancel.is_cancelled() {
            return self.abort(run, ExecutionPhase::Injection).await;
        }
        self.enter_phase(run, ExecutionPhase::Injection);
        let injection = self.inject_all(run, cancel).await;
        if injection.cancelled {
            return self.abort(run, ExecutionPhase::Injection).await;
        }
        self.finish_phase(run, ExecutionPhase::Injection);

        if injection.attempted > 0 && injection.injected == 0 {
            warn!(attempted = injection.attempted, "Every fault injection failed");
            return ExperimentStatus::Failed;
        }
        if injection.stopped_by_policy {
            warn!("Injection stopped after a failure; recovering injected faults");
            self.enter_phase(run, ExecutionPhase::Recovery);
            self.recover(run).await;
            self.finish_phase(run, ExecutionPhase::Recovery);
            return ExperimentStatus::Failed;
        }

        if cancel.is_cancelled() {
            return self.abort(run, ExecutionPhase::Observation).await;
        }
        self.enter_phase(run, ExecutionPhase::Observation);
        if self.observe(run, cancel).await {
            return self.abort(run, ExecutionPhase::Observation).await;
        }
        self.finish_phase(run, ExecutionPhase::Observation);

        if cancel.is_cancelled() {
            return self.abort(run, ExecutionPhase::Recovery).await;
        }
        self.enter_phase(run, ExecutionPhase::Recovery);
        self.recover(run).await;
        self.finish_phase(run, ExecutionPhase::Recovery);

        if cancel.is_cancelled() {
            return self.abort(run, ExecutionPhase::Validation).await;
        }
        self.enter_phase(run, ExecutionPhase::Validation);
        run.results.finish(ExperimentStatus::Completed, Utc::now());
        debug!(
            hypothesis_valid = run.results.hypothesis_valid,
            failures = run.results.impact.failure_count,
            "Results validated"
        );
        self.finish_phase(run, ExecutionPhase::Validation);

        ExperimentStatus::Completed
    }

    fn enter_phase(&self, run: &Run<'_>, phase: ExecutionPhase) {
        debug!(phase = %phase, "Entering phase");
        self.registry.enter_phase(&run.experiment.id, phase);
        self.events
            .publish(&run.experiment.id, ExperimentEventKind::PhaseChanged { phase });
    }

    fn finish_phase(&self, run: &mut Run<'_>, phase: ExecutionPhase) {
        run.results.phases_completed.push(phase);
        self.registry.finish_phase(&run.experiment.id, phase);
    }

    /// Cancellation: remove everything injected so far, no health polling
    async fn abort(&self, run: &mut Run<'_>, phase: ExecutionPhase) -> ExperimentStatus {
        warn!(phase = %phase, "Experiment cancelled, removing injected faults");
        run.results.record_observation(
            Observation::event(format!("experiment cancelled during {phase}"))
                .with_severity(Severity::Medium),
        );
        for index in run.pending_removals() {
            self.remove_fault(run, index, "abort").await;
        }
        ExperimentStatus::Aborted
    }

    /// Take a baseline sample and note faults without an injector
    async fn prepare(&self, run: &mut Run<'_>) {
        for fault in run.experiment.enabled_faults() {
            if self.injectors.resolve(fault).is_none() && !run.experiment.dry_run {
                warn!(fault_id = %fault.id, fault_type = fault.type_name(), "No injector registered");
            }
        }
        self.sample_metrics(run, "baseline").await;
    }

    async fn inject_all(&self, run: &mut Run<'_>, cancel: &CancellationToken) -> InjectionOutcome {
        let policy = self
            .config
            .failure_policy
            .unwrap_or(run.experiment.failure_policy);
        let experiment = run.experiment;
        let mut outcome = InjectionOutcome::default();

        for fault in &experiment.faults {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            if !fault.enabled {
                debug!(fault_id = %fault.id, "Fault disabled, skipping");
                continue;
            }
            let sample = (self.sampler)();
            if !fault.is_selected(sample) {
                debug!(fault_id = %fault.id, sample, probability = fault.probability, "Fault not selected");
                run.results.record_observation(
                    Observation::event(format!("fault '{}' skipped by probability", fault.id))
                        .with_field("fault_id", fault.id.as_str()),
                );
                continue;
            }
            if experiment.dry_run {
                info!(fault_id = %fault.id, fault_type = fault.type_name(), "Dry run, not injecting");
                run.results.record_observation(
                    Observation::event(format!(
                        "dry run: would inject {} fault '{}'",
                        fault.type_name(),
                        fault.id
                    ))
                    .with_field("fault_id", fault.id.as_str()),
                );
                continue;
            }

            outcome.attempted += 1;
            match self.inject_one(run, fault).await {
                Ok(()) => outcome.injected += 1,
                Err(e) => {
                    warn!(fault_id = %fault.id, error = %e, "Fault injection failed");
                    metrics::counter!("chaos_fault_injection_failures_total", "category" => fault.category().label())
                        .increment(1);
                    run.fail(
                        Failure::new(
                            ExecutionPhase::Injection,
                            FailureKind::Injection,
                            fault.severity,
                            e.to_string(),
                        )
                        .for_fault(fault.id.clone()),
                    );
                    if policy == InjectionFailurePolicy::AbortOnFirstFailure {
                        outcome.stopped_by_policy = true;
                        break;
                    }
                },
            }
        }
        outcome
    }

    async fn inject_one(
        &self,
        run: &mut Run<'_>,
        fault: &FaultDefinition,
    ) -> Result<(), ApplicationError> {
        let experiment = run.experiment;
        let injector = self.injectors.resolve(fault).ok_or_else(|| {
            ApplicationError::injection(
                fault.id.as_str(),
                format!("no injector registered for fault type '{}'", fault.type_name()),
            )
        })?;

        injector
            .inject(&experiment.id, fault, &experiment.target)
            .await?;

        let remove_at = instant_after(fault.duration).min(run.deadline);
        run.active.push(ActiveFault {
            fault: fault.clone(),
            injector,
            remove_at,
            removed: false,
        });
        run.results.injected_faults.push(fault.id.clone());
        run.results.record_observation(
            Observation::event(format!("fault '{}' injected", fault.id))
                .with_field("fault_id", fault.id.as_str())
                .with_field("fault_type", fault.type_name()),
        );
        self.registry
            .set_fault_active(&experiment.id, &fault.id, true);
        self.events.publish(
            &experiment.id,
            ExperimentEventKind::FaultInjected {
                fault_id: fault.id.clone(),
            },
        );
        metrics::counter!("chaos_fault_injections_total", "category" => fault.category().label())
            .increment(1);
        info!(fault_id = %fault.id, fault_type = fault.type_name(), "Fault injected");
        Ok(())
    }

    /// Record metric samples for the observation window
    ///
    /// Faults whose removal deadline passes during the window are removed
    /// on time. Returns true when cancelled.
    async fn observe(&self, run: &mut Run<'_>, cancel: &CancellationToken) -> bool {
        let window = if run.experiment.dry_run {
            Duration::ZERO
        } else {
            run.experiment.duration
        };
        let window_end = instant_after(window).min(run.deadline);

        let mut ticker = interval(self.config.monitoring_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        self.sample_metrics(run, "observation").await;

        loop {
            self.remove_expired(run).await;
            if Instant::now() >= window_end {
                return false;
            }

            let wake_at = run.next_expiry().map_or(window_end, |at| at.min(window_end));
            let wake = tokio::select! {
                biased;
                () = cancel.cancelled() => Wake::Cancelled,
                () = sleep_until(wake_at) => Wake::Expiry,
                _ = ticker.tick() => Wake::Tick,
            };
            match wake {
                Wake::Cancelled => return true,
                Wake::Tick => self.sample_metrics(run, "observation").await,
                Wake::Expiry => {},
            }
        }
    }

    async fn remove_expired(&self, run: &mut Run<'_>) {
        let now = Instant::now();
        let expired: Vec<usize> = run
            .pending_removals()
            .into_iter()
            .filter(|i| run.active[*i].remove_at <= now)
            .collect();
        for index in expired {
            self.remove_fault(run, index, "duration elapsed").await;
        }
    }

    async fn sample_metrics(&self, run: &mut Run<'_>, stage: &str) {
        let Some(source) = &self.metrics_source else {
            return;
        };
        match source.sample(&run.experiment.target).await {
            Ok(samples) => {
                run.results.record_observation(
                    Observation::metrics(&samples).with_field("stage", stage),
                );
            },
            Err(e) => {
                warn!(error = %e, stage, "Metric sampling failed");
                run.results.record_observation(
                    Observation::event(format!("metric sampling failed: {e}"))
                        .with_severity(Severity::Medium),
                );
            },
        }
    }

    /// Remove one fault, retrying per its recovery settings
    ///
    /// A removal that keeps failing is recorded as a failure.
    async fn remove_fault(&self, run: &mut Run<'_>, index: usize, reason: &str) -> bool {
        let experiment = run.experiment;
        let fault = run.active[index].fault.clone();
        let injector = Arc::clone(&run.active[index].injector);
        let settings: &RecoveryConfig = fault.recovery.as_ref().unwrap_or(&experiment.recovery);
        let attempts = settings.removal_attempts();

        let mut last_error = None;
        for attempt in 1..=attempts {
            match injector
                .remove(&experiment.id, &fault, &experiment.target)
                .await
            {
                Ok(()) => {
                    run.active[index].removed = true;
                    self.registry
                        .set_fault_active(&experiment.id, &fault.id, false);
                    self.events.publish(
                        &experiment.id,
                        ExperimentEventKind::FaultRemoved {
                            fault_id: fault.id.clone(),
                        },
                    );
                    info!(fault_id = %fault.id, reason, attempt, "Fault removed");
                    return true;
                },
                Err(e) => {
                    warn!(fault_id = %fault.id, attempt, error = %e, "Fault removal failed");
                    last_error = Some(e);
                    if attempt < attempts {
                        sleep(settings.retry_delay).await;
                    }
                },
            }
        }

        let message = last_error.map_or_else(String::new, |e| e.to_string());
        run.fail(
            Failure::new(
                ExecutionPhase::Recovery,
                FailureKind::Removal,
                fault.severity,
                format!("failed to remove fault after {attempts} attempts: {message}"),
            )
            .for_fault(fault.id.clone()),
        );
        false
    }

    /// Remove remaining faults and wait for health checks
    async fn recover(&self, run: &mut Run<'_>) {
        for index in run.pending_removals() {
            self.remove_fault(run, index, "recovery").await;
        }
        if run.active.is_empty() {
            debug!("Nothing injected, recovery not needed");
            return;
        }

        let experiment = run.experiment;
        let settings = &experiment.recovery;
        let result = if settings.automatic {
            let mut checks = settings.health_checks.clone();
            for extra in run
                .active
                .iter()
                .filter_map(|a| a.fault.recovery.as_ref())
                .flat_map(|r| r.health_checks.iter())
            {
                if !checks.contains(extra) {
                    checks.push(extra.clone());
                }
            }
            self.recovery.recover(&checks, settings.timeout).await
        } else {
            let all_removed = run.active.iter().all(|a| a.removed);
            let mut result = RecoveryResult::recovered(Duration::ZERO, 0);
            if !all_removed {
                result.successful = false;
                result.error = Some("faults still active after removal".to_string());
            }
            result
        };

        metrics::histogram!("chaos_recovery_duration_seconds").record(result.duration.as_secs_f64());
        let failed = result.is_failure();
        if failed {
            warn!(error = ?result.error, "Recovery did not complete");
        }
        run.results.record_observation(Observation::health("recovery", result.successful));
        run.results.recovery = result;

        if failed && settings.rollback {
            self.rollback(run).await;
        }

        if self.metrics_source.is_some() {
            self.sample_metrics(run, "post_recovery").await;
            if let Err(e) = self.recovery.validate_metrics(&run.results.metrics) {
                warn!(error = %e, "Post-recovery metrics out of bounds");
                run.fail(Failure::new(
                    ExecutionPhase::Recovery,
                    FailureKind::Observation,
                    Severity::Medium,
                    e.to_string(),
                ));
            }
        }
    }

    /// Remove every injected fault once more, ignoring the tracked state
    ///
    /// Removal is idempotent; a fault reported as removed may still be
    /// affecting the target when health checks keep failing.
    async fn rollback(&self, run: &mut Run<'_>) {
        let experiment = run.experiment;
        warn!(faults = run.active.len(), "Rolling back injected faults after failed recovery");
        let mut reverted = 0usize;
        for index in 0..run.active.len() {
            let active = &run.active[index];
            let outcome = active
                .injector
                .remove(&experiment.id, &active.fault, &experiment.target)
                .await;
            let active = &mut run.active[index];
            match outcome {
                Ok(()) => {
                    reverted += 1;
                    if !active.removed {
                        active.removed = true;
                        self.registry
                            .set_fault_active(&experiment.id, &active.fault.id, false);
                    }
                },
                Err(e) => {
                    warn!(fault_id = %active.fault.id, error = %e, "Rollback removal failed");
                },
            }
        }
        run.results.record_observation(
            Observation::event(format!(
                "rollback re-issued removal for {reverted} of {} fault(s)",
                run.active.len()
            ))
            .with_severity(Severity::Medium),
        );
    }

    /// Force-remove anything still active
    async fn cleanup(&self, run: &mut Run<'_>) {
        let pending = run.pending_removals();
        if !pending.is_empty() {
            warn!(count = pending.len(), "Force-removing faults still active");
        }
        for index in pending {
            self.remove_fault(run, index, "cleanup").await;
        }
    }
}

/// `now + after`, saturating at roughly thirty years out
fn instant_after(after: Duration) -> Instant {
    const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);
    let now = Instant::now();
    now.checked_add(after)
        .unwrap_or_else(|| now + FAR_FUTURE)
}

/// Follow-up suggestions derived from the recorded failures
fn recommendations(results: &ExperimentResults) -> Vec<String> {
    let mut out = Vec::new();
    let count = |kind: FailureKind| results.failures.iter().filter(|f| f.kind == kind).count();

    if count(FailureKind::Injection) > 0 {
        out.push(format!(
            "{} fault injection(s) failed; check injector connectivity and permissions",
            count(FailureKind::Injection)
        ));
    }
    if count(FailureKind::Removal) > 0 {
        out.push("some faults could not be removed; verify the target manually".to_string());
    }
    if results.recovery.is_failure() {
        out.push(format!(
            "recovery did not complete within {:?}; review health checks and fallback paths",
            results.recovery.duration
        ));
    }
    if count(FailureKind::Observation) > 0 {
        out.push("post-recovery metrics exceeded thresholds; investigate residual errors".to_string());
    }
    if !results.hypothesis_valid {
        out.push("critical failures invalidated the hypothesis; revisit the target's resilience".to_string());
    }
    out
}
