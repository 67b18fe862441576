//! Resilience scoring and blast-radius classification
//!
//! Both functions are pure and deterministic. The penalty weights and the
//! category table are fixed so scores stay comparable across runs.

use chrono::Utc;
use domain::entities::{
    BlastRadius, BlastRadiusImpact, Experiment, ExperimentResults, FaultCategory, ImpactScope,
};
use domain::value_objects::Severity;

use crate::ports::ResilienceReport;

const BASE_SCORE: i64 = 100;
const FAILURE_PENALTY: i64 = 10;
const INVALID_HYPOTHESIS_PENALTY: i64 = 20;
const FAILED_RECOVERY_PENALTY: i64 = 15;

/// Score a finished run from 0 to 100
///
/// | Condition                          | Penalty |
/// |------------------------------------|---------|
/// | each failure                       | -10     |
/// | hypothesis invalid                 | -20     |
/// | recovery attempted, not successful | -15     |
pub fn calculate_resilience_score(results: &ExperimentResults) -> u8 {
    let failures = i64::try_from(results.failures.len()).unwrap_or(i64::MAX / FAILURE_PENALTY);

    let mut score = BASE_SCORE - failures.saturating_mul(FAILURE_PENALTY);
    if !results.hypothesis_valid {
        score -= INVALID_HYPOTHESIS_PENALTY;
    }
    if results.recovery.is_failure() {
        score -= FAILED_RECOVERY_PENALTY;
    }

    u8::try_from(score.clamp(0, BASE_SCORE)).unwrap_or(0)
}

/// Scope and severity for a fault category
pub const fn category_profile(category: FaultCategory) -> (ImpactScope, Severity) {
    match category {
        FaultCategory::Network => (ImpactScope::Network, Severity::Medium),
        FaultCategory::Service => (ImpactScope::Service, Severity::High),
        FaultCategory::Data => (ImpactScope::Data, Severity::High),
        FaultCategory::Resource => (ImpactScope::Infrastructure, Severity::Medium),
        FaultCategory::Custom => (ImpactScope::Service, Severity::Low),
    }
}

/// Classify the potential impact of an experiment
///
/// With several faults the most severe profile wins; ties keep the first
/// fault. An experiment without faults is classified as service/low.
pub fn generate_blast_radius(experiment: &Experiment) -> BlastRadius {
    let mut chosen: Option<(ImpactScope, Severity, &str)> = None;
    for fault in &experiment.faults {
        let (scope, severity) = category_profile(fault.category());
        if chosen.is_none_or(|(_, current, _)| severity > current) {
            chosen = Some((scope, severity, fault.type_name()));
        }
    }
    let (scope, severity, fault_type) =
        chosen.unwrap_or((ImpactScope::Service, Severity::Low, "unknown"));

    BlastRadius {
        scope,
        severity,
        impact: BlastRadiusImpact {
            target_name: experiment.target.name.clone(),
            fault_type: fault_type.to_string(),
            duration: experiment.duration,
            namespace: experiment.target.namespace.clone(),
        },
    }
}

/// Assemble a report from an experiment and its results
pub fn build_report(experiment: &Experiment, results: &ExperimentResults) -> ResilienceReport {
    ResilienceReport {
        experiment_id: experiment.id.clone(),
        experiment_name: experiment.name.clone(),
        score: calculate_resilience_score(results),
        blast_radius: generate_blast_radius(experiment),
        results: results.clone(),
        generated_at: Utc::now(),
    }
}
