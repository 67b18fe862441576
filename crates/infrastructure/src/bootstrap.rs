//! Wiring of the engine from configuration

use std::sync::Arc;

use application::ports::{ExperimentStorePort, HealthCheckPort, MetricsSourcePort};
use application::{
    ApplicationError, ChaosOrchestrator, ExecutorConfig, ExperimentExecutor, RecoveryValidator,
    SafetyPolicyEngine, SchedulerConfig,
};
use tracing::info;

use crate::config::AppConfig;
use crate::health::{HttpHealthCheck, HttpMetricsSource};
use crate::injectors::{FaultBackend, default_registry};
use crate::persistence::{DatabaseError, SqliteExperimentStore, create_pool};
use crate::report::TracingReportSink;

/// Open the configured experiment database
pub fn open_store(config: &AppConfig) -> Result<SqliteExperimentStore, DatabaseError> {
    let pool = create_pool(&config.database)?;
    Ok(SqliteExperimentStore::new(Arc::new(pool)))
}

/// Recovery validator with every configured HTTP health check registered
pub fn build_recovery_validator(config: &AppConfig) -> Result<RecoveryValidator, ApplicationError> {
    config.health_checks.iter().try_fold(
        RecoveryValidator::new((&config.recovery).into()),
        |validator, settings| {
            let check: Arc<dyn HealthCheckPort> = Arc::new(HttpHealthCheck::new(settings)?);
            Ok(validator.with_check(settings.name.clone(), check))
        },
    )
}

/// Orchestrator over `backend`, persisting to `store` when given
pub fn build_orchestrator(
    config: &AppConfig,
    backend: Arc<dyn FaultBackend>,
    store: Option<Arc<dyn ExperimentStorePort>>,
) -> Result<ChaosOrchestrator, ApplicationError> {
    let injectors = default_registry(&backend, &config.backend_retry);
    let recovery = build_recovery_validator(config)?;
    let policy = SafetyPolicyEngine::new(config.policy.clone());

    let mut executor = ExperimentExecutor::new(
        injectors,
        recovery,
        policy,
        ExecutorConfig::from(&config.executor),
    );
    if let Some(settings) = &config.metrics {
        let source: Arc<dyn MetricsSourcePort> = Arc::new(HttpMetricsSource::new(settings)?);
        executor = executor.with_metrics_source(source);
    }

    let mut orchestrator =
        ChaosOrchestrator::new(executor, SchedulerConfig::from(&config.scheduler))
            .with_report_sink(Arc::new(TracingReportSink::new().warn_below(50)));
    if let Some(store) = store {
        orchestrator = orchestrator.with_store(store);
    }

    info!(
        backend = backend.name(),
        policy = %config.policy.name,
        rules = config.policy.rules.len(),
        health_checks = config.health_checks.len(),
        "chaos engine ready"
    );
    Ok(orchestrator)
}
