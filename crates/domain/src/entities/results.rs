//! Experiment results

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    entities::{Observation, ObservationKind, RecoveryResult},
    value_objects::{ExecutionPhase, ExperimentStatus, FaultId, Severity},
};

/// What went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// An injector refused or failed to inject a fault
    Injection,
    /// A fault could not be removed
    Removal,
    /// Post-recovery metrics were out of bounds
    Observation,
}

/// A failure recorded during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault_id: Option<FaultId>,
    pub phase: ExecutionPhase,
    pub kind: FailureKind,
    pub severity: Severity,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl Failure {
    pub fn new(
        phase: ExecutionPhase,
        kind: FailureKind,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            fault_id: None,
            phase,
            kind,
            severity,
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn for_fault(mut self, fault_id: FaultId) -> Self {
        self.fault_id = Some(fault_id);
        self
    }
}

/// Aggregated impact of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ImpactSummary {
    /// Mean of every numeric field of the metric observations, keyed by name
    pub metric_averages: BTreeMap<String, f64>,
    pub failure_count: usize,
    pub critical_failures: usize,
    pub recovered: bool,
}

impl ImpactSummary {
    /// Summarize observations, failures and the recovery outcome
    pub fn compute(
        observations: &[Observation],
        failures: &[Failure],
        recovery: &RecoveryResult,
    ) -> Self {
        let mut sums: BTreeMap<String, (f64, u32)> = BTreeMap::new();
        for (name, value) in observations
            .iter()
            .filter(|o| o.kind == ObservationKind::Metric)
            .flat_map(Observation::numeric_fields)
        {
            let entry = sums.entry(name.to_string()).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }

        Self {
            metric_averages: sums
                .into_iter()
                .map(|(name, (sum, count))| (name, sum / f64::from(count)))
                .collect(),
            failure_count: failures.len(),
            critical_failures: failures
                .iter()
                .filter(|f| f.severity.is_critical())
                .count(),
            recovered: !recovery.attempted || recovery.successful,
        }
    }
}

/// Everything recorded about a finished run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResults {
    pub status: ExperimentStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,
    /// False when any critical-severity failure was recorded
    pub hypothesis_valid: bool,
    #[serde(default)]
    pub phases_completed: Vec<ExecutionPhase>,
    #[serde(default)]
    pub injected_faults: Vec<FaultId>,
    #[serde(default)]
    pub observations: Vec<Observation>,
    #[serde(default)]
    pub failures: Vec<Failure>,
    #[serde(default)]
    pub recovery: RecoveryResult,
    /// Latest sampled value of every metric
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub impact: ImpactSummary,
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// Set when the run was a dry run and nothing was injected
    #[serde(default)]
    pub dry_run: bool,
}

impl ExperimentResults {
    /// Empty results for a run that starts now
    pub fn started(at: DateTime<Utc>) -> Self {
        Self {
            status: ExperimentStatus::Running,
            started_at: at,
            finished_at: at,
            duration: Duration::ZERO,
            hypothesis_valid: true,
            phases_completed: Vec::new(),
            injected_faults: Vec::new(),
            observations: Vec::new(),
            failures: Vec::new(),
            recovery: RecoveryResult::not_attempted(),
            metrics: BTreeMap::new(),
            impact: ImpactSummary::default(),
            recommendations: Vec::new(),
            dry_run: false,
        }
    }

    /// Whether no critical failure invalidates the hypothesis
    pub fn hypothesis_holds(failures: &[Failure]) -> bool {
        !failures.iter().any(|f| f.severity.is_critical())
    }

    /// Record a failure
    pub fn record_failure(&mut self, failure: Failure) {
        self.failures.push(failure);
    }

    /// Record an observation, keeping the metric snapshot current
    pub fn record_observation(&mut self, observation: Observation) {
        if observation.kind == ObservationKind::Metric {
            for (name, value) in observation.numeric_fields() {
                self.metrics.insert(name.to_string(), value);
            }
        }
        self.observations.push(observation);
    }

    /// Finalize status, timing, hypothesis and impact
    pub fn finish(&mut self, status: ExperimentStatus, at: DateTime<Utc>) {
        self.status = status;
        self.finished_at = at;
        self.duration = (at - self.started_at).to_std().unwrap_or_default();
        self.hypothesis_valid = Self::hypothesis_holds(&self.failures);
        self.impact = ImpactSummary::compute(&self.observations, &self.failures, &self.recovery);
    }

    /// Failures recorded during injection
    pub fn injection_failures(&self) -> usize {
        self.failures
            .iter()
            .filter(|f| f.kind == FailureKind::Injection)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(severity: Severity) -> Failure {
        Failure::new(
            ExecutionPhase::Injection,
            FailureKind::Injection,
            severity,
            "boom",
        )
    }

    #[test]
    fn critical_failure_invalidates_hypothesis() {
        assert!(ExperimentResults::hypothesis_holds(&[failure(Severity::High)]));
        assert!(!ExperimentResults::hypothesis_holds(&[
            failure(Severity::Low),
            failure(Severity::Critical)
        ]));
    }

    #[test]
    fn impact_averages_numeric_fields() {
        let first = Observation::new(ObservationKind::Metric)
            .with_field("latency_ms", 100.0)
            .with_field("note", "ignored");
        let second = Observation::new(ObservationKind::Metric)
            .with_field("latency_ms", 300.0);

        let impact = ImpactSummary::compute(
            &[first, second],
            &[failure(Severity::Critical)],
            &RecoveryResult::recovered(Duration::from_secs(1), 1),
        );

        assert!((impact.metric_averages["latency_ms"] - 200.0).abs() < 1e-9);
        assert!(!impact.metric_averages.contains_key("note"));
        assert_eq!(impact.failure_count, 1);
        assert_eq!(impact.critical_failures, 1);
        assert!(impact.recovered);
    }

    #[test]
    fn impact_ignores_numbers_outside_metric_observations() {
        let metric = Observation::new(ObservationKind::Metric).with_field("latency_ms", 100.0);
        let log = Observation::new(ObservationKind::Log).with_field("latency_ms", 900.0);
        let event = Observation::event("slow request").with_field("retries", 4);

        let impact = ImpactSummary::compute(
            &[metric, log, event],
            &[],
            &RecoveryResult::not_attempted(),
        );

        assert!((impact.metric_averages["latency_ms"] - 100.0).abs() < 1e-9);
        assert!(!impact.metric_averages.contains_key("retries"));
    }

    #[test]
    fn finish_sets_duration_and_hypothesis() {
        let start = Utc::now();
        let mut results = ExperimentResults::started(start);
        results.record_failure(failure(Severity::Critical));
        results.finish(
            ExperimentStatus::Completed,
            start + chrono::Duration::seconds(30),
        );

        assert_eq!(results.duration, Duration::from_secs(30));
        assert!(!results.hypothesis_valid);
        assert_eq!(results.status, ExperimentStatus::Completed);
    }

    #[test]
    fn metric_observation_updates_snapshot() {
        let mut results = ExperimentResults::started(Utc::now());
        let mut samples = BTreeMap::new();
        samples.insert("error_rate".to_string(), 0.1);
        results.record_observation(Observation::metrics(&samples));
        samples.insert("error_rate".to_string(), 0.3);
        results.record_observation(Observation::metrics(&samples));

        assert!((results.metrics["error_rate"] - 0.3).abs() < 1e-9);
        assert_eq!(results.observations.len(), 2);
    }
}
