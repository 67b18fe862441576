//! Property-based tests for scoring and policy evaluation
//!
//! Both are pure functions, so every property is checked on arbitrary inputs.

use std::time::Duration;

use application::{SafetyPolicyEngine, calculate_resilience_score, generate_blast_radius};
use chrono::{TimeZone, Utc};
use domain::{
    entities::{
        Experiment, ExperimentResults, Failure, FailureKind, FaultConfig, FaultDefinition,
        PolicyRule, RecoveryResult, RuleCondition, SafetyPolicy, Target,
    },
    value_objects::{ExecutionPhase, Severity},
};
use proptest::prelude::*;

fn severity() -> impl Strategy<Value = Severity> {
    prop_oneof![
        Just(Severity::Low),
        Just(Severity::Medium),
        Just(Severity::High),
        Just(Severity::Critical),
    ]
}

fn recovery() -> impl Strategy<Value = RecoveryResult> {
    prop_oneof![
        Just(RecoveryResult::not_attempted()),
        Just(RecoveryResult::recovered(Duration::from_secs(4), 2)),
        Just(RecoveryResult::failed(Duration::from_secs(300), 60, "timeout")),
    ]
}

fn results(failures: usize, hypothesis_valid: bool, recovery: RecoveryResult) -> ExperimentResults {
    let mut results = ExperimentResults::started(Utc::now());
    for _ in 0..failures {
        results.record_failure(Failure::new(
            ExecutionPhase::Injection,
            FailureKind::Injection,
            Severity::Medium,
            "refused",
        ));
    }
    results.hypothesis_valid = hypothesis_valid;
    results.recovery = recovery;
    results
}

fn expected_score(failures: usize, hypothesis_valid: bool, recovery: &RecoveryResult) -> u8 {
    let mut score = 100_i64 - 10 * i64::try_from(failures).unwrap();
    if !hypothesis_valid {
        score -= 20;
    }
    if recovery.attempted && !recovery.successful {
        score -= 15;
    }
    u8::try_from(score.clamp(0, 100)).unwrap()
}

mod scoring_tests {
    use super::*;

    proptest! {
        #[test]
        fn score_matches_penalty_table(
            failures in 0usize..20,
            valid in any::<bool>(),
            recovery in recovery(),
        ) {
            let r = results(failures, valid, recovery.clone());
            prop_assert_eq!(calculate_resilience_score(&r), expected_score(failures, valid, &recovery));
        }

        #[test]
        fn score_is_deterministic(failures in 0usize..20, valid in any::<bool>(), recovery in recovery()) {
            let r = results(failures, valid, recovery);
            prop_assert_eq!(calculate_resilience_score(&r), calculate_resilience_score(&r.clone()));
        }

        #[test]
        fn more_failures_never_raise_the_score(failures in 0usize..15, valid in any::<bool>(), recovery in recovery()) {
            let fewer = results(failures, valid, recovery.clone());
            let more = results(failures + 1, valid, recovery);
            prop_assert!(calculate_resilience_score(&more) <= calculate_resilience_score(&fewer));
        }
    }
}

mod blast_radius_tests {
    use super::*;

    fn fault_config() -> impl Strategy<Value = FaultConfig> {
        prop_oneof![
            Just(FaultConfig::Unavailability),
            (1u64..5_000).prop_map(|ms| FaultConfig::Latency {
                delay: Duration::from_millis(ms),
                jitter: Duration::ZERO,
            }),
            (0.0f64..=100.0).prop_map(|loss_percent| FaultConfig::PacketLoss { loss_percent }),
            (1u64..4_096).prop_map(|megabytes| FaultConfig::MemoryExhaustion { megabytes }),
            Just(FaultConfig::StorageFailure {
                volume: "data".to_string(),
                read_only: true,
            }),
        ]
    }

    proptest! {
        #[test]
        fn most_severe_fault_sets_the_radius(configs in prop::collection::vec(fault_config(), 1..6)) {
            let mut exp = Experiment::new("drill", Target::new("service", "api"), Duration::from_secs(60));
            for (i, config) in configs.into_iter().enumerate() {
                exp = exp.with_fault(
                    FaultDefinition::new(format!("f{i}").as_str(), config, Duration::from_secs(10)).unwrap(),
                );
            }
            let radius = generate_blast_radius(&exp);
            let max = exp
                .faults
                .iter()
                .map(|f| application::category_profile(f.category()).1)
                .max()
                .unwrap();
            prop_assert_eq!(radius.severity, max);
            prop_assert_eq!(radius.impact.target_name, "api");
        }
    }
}

mod policy_tests {
    use super::*;

    fn experiment(minutes: u64, severity: Severity) -> Experiment {
        Experiment::new(
            "drill",
            Target::new("service", "api"),
            Duration::from_secs(minutes * 60),
        )
        .with_fault(
            FaultDefinition::new("f1", FaultConfig::Unavailability, Duration::from_secs(60))
                .unwrap()
                .with_severity(severity),
        )
    }

    fn policy(max_minutes: u64) -> SafetyPolicy {
        SafetyPolicy::new("prod")
            .with_rule(PolicyRule::new(
                "max-duration",
                RuleCondition::MaxDuration {
                    max: Some(Duration::from_secs(max_minutes * 60)),
                },
            ))
            .with_rule(PolicyRule::new(
                "approval",
                RuleCondition::RequireApproval { min_severity: None },
            ))
    }

    proptest! {
        #[test]
        fn duration_violation_iff_over_limit(minutes in 1u64..240, max in 1u64..240) {
            let now = Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap();
            let violations = SafetyPolicyEngine::evaluate(&experiment(minutes, Severity::Low), &policy(max), now);
            let has = violations.iter().any(|v| v.message.contains("duration exceeds policy limits"));
            prop_assert_eq!(has, minutes > max);
        }

        #[test]
        fn approval_violation_iff_critical(minutes in 1u64..60, sev in severity()) {
            let now = Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap();
            let violations = SafetyPolicyEngine::evaluate(&experiment(minutes, sev), &policy(120), now);
            let has = violations.iter().any(|v| v.message.contains("requires approval"));
            prop_assert_eq!(has, sev == Severity::Critical);
        }

        #[test]
        fn evaluation_is_pure(minutes in 1u64..240, sev in severity()) {
            let now = Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap();
            let exp = experiment(minutes, sev);
            let first = SafetyPolicyEngine::evaluate(&exp, &policy(30), now);
            let second = SafetyPolicyEngine::evaluate(&exp, &policy(30), now);
            prop_assert_eq!(first, second);
        }
    }
}
