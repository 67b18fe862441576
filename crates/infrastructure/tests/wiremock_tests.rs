//! Integration tests for the HTTP adapters and backend retry
//!
//! Tests cover:
//! - Recovery polling against a live HTTP health endpoint
//! - Metrics sampling and threshold checks
//! - Retry delay bounds with property-based tests

use std::sync::Arc;
use std::time::Duration;

use application::ports::{HealthCheckPort, MetricsSourcePort};
use application::{RecoveryValidator, RecoveryValidatorConfig};
use domain::entities::Target;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use infrastructure::{
    HttpCheckSettings, HttpHealthCheck, HttpMetricsSource, MetricsSourceSettings, RetryConfig,
};

fn fast_validator() -> RecoveryValidatorConfig {
    RecoveryValidatorConfig {
        poll_interval: Duration::from_millis(20),
        max_recovery_time: Duration::from_secs(5),
        ..RecoveryValidatorConfig::default()
    }
}

fn health_check(server: &MockServer) -> Arc<dyn HealthCheckPort> {
    let settings = HttpCheckSettings {
        name: "api".into(),
        url: format!("{}/health", server.uri()),
        expected_status: None,
        timeout_secs: 1,
    };
    Arc::new(HttpHealthCheck::new(&settings).unwrap())
}

// ============================================================================
// Recovery Tests
// ============================================================================

mod recovery_tests {
    use super::*;

    #[tokio::test]
    async fn recovers_once_endpoint_turns_healthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let validator = RecoveryValidator::new(fast_validator()).with_check("api", health_check(&server));
        let result = validator
            .validate_recovery(&["api".to_string()], Duration::from_secs(5))
            .await
            .unwrap();

        assert!(result.successful);
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test]
    async fn unhealthy_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let validator = RecoveryValidator::new(fast_validator()).with_check("api", health_check(&server));
        let result = validator
            .recover(&[], Duration::from_millis(150))
            .await;

        assert!(result.attempted);
        assert!(!result.successful);
        assert!(result.error.unwrap().contains("timed out"));
    }
}

// ============================================================================
// Metrics Tests
// ============================================================================

mod metrics_tests {
    use super::*;

    #[tokio::test]
    async fn sampled_metrics_feed_threshold_checks() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metrics/checkout"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error_rate": 0.2,
                "success_rate": 0.8,
                "region": "eu-west-1"
            })))
            .mount(&server)
            .await;

        let source = HttpMetricsSource::new(&MetricsSourceSettings {
            url: format!("{}/metrics/{{target}}", server.uri()),
            timeout_secs: 1,
        })
        .unwrap();
        let metrics = source
            .sample(&Target::new("service", "checkout"))
            .await
            .unwrap();
        assert_eq!(metrics.len(), 2);

        let validator = RecoveryValidator::new(RecoveryValidatorConfig::default());
        let err = validator.validate_metrics(&metrics).unwrap_err();
        assert!(err.to_string().contains("error rate"));
        assert!(err.to_string().contains("success rate"));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn delay_never_exceeds_max_without_jitter(
            initial in 1u64..1000u64,
            max in 1000u64..100_000u64,
            attempt in 0u32..40u32
        ) {
            let config = RetryConfig::new(initial, max, 10).without_jitter();
            prop_assert!(config.delay_for_attempt(attempt).as_millis() <= u128::from(max));
        }

        #[test]
        fn delays_grow_monotonically_without_jitter(
            initial in 1u64..1000u64,
            max in 1000u64..100_000u64,
            attempt in 0u32..30u32
        ) {
            let config = RetryConfig::new(initial, max, 10).without_jitter();
            prop_assert!(config.delay_for_attempt(attempt) <= config.delay_for_attempt(attempt + 1));
        }

        #[test]
        fn jitter_stays_within_factor(
            initial in 100u64..1000u64,
            max in 5000u64..50_000u64,
            jitter_factor in 0.0f64..0.5f64,
            attempt in 0u32..10u32
        ) {
            let config = RetryConfig {
                jitter_factor,
                ..RetryConfig::new(initial, max, 10)
            };
            let bound = config.clone().without_jitter().delay_for_attempt(attempt).as_secs_f64() * 1000.0;
            let spread = bound * jitter_factor;

            for _ in 0..10 {
                let delay = config.delay_for_attempt(attempt).as_secs_f64() * 1000.0;
                prop_assert!(delay >= bound - spread - 1.0);
                prop_assert!(delay <= bound + spread + 1.0);
            }
        }
    }
}
