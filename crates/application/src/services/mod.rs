//! Application services - experiment lifecycle, policy, scoring and scheduling

mod coordinator;
mod events;
mod executor;
mod injector_registry;
mod orchestrator;
mod recovery_validator;
mod registry;
mod resilience_scorer;
mod safety_policy;
mod scheduler;

pub use coordinator::{
    CoordinationMode, CoordinationPolicy, DistributedCoordinator, DistributedResults,
    GateCondition, RegionOutcome, RegionPlan, RegionStatus,
};
pub use events::{EVENT_CHANNEL_CAPACITY, EventPublisher, ExperimentEvent, ExperimentEventKind};
pub use executor::{ExecutorConfig, ExperimentExecutor};
pub use injector_registry::InjectorRegistry;
pub use orchestrator::ChaosOrchestrator;
pub use recovery_validator::{
    ERROR_RATE_METRIC, RecoveryValidator, RecoveryValidatorConfig, SUCCESS_RATE_METRIC,
};
pub use registry::{ExperimentProgress, ExperimentRegistry};
pub use resilience_scorer::{
    build_report, calculate_resilience_score, category_profile, generate_blast_radius,
};
pub use safety_policy::{AdmissionDecision, SafetyPolicyEngine};
pub use scheduler::{AdmissionMode, ExperimentScheduler, SchedulerConfig, SchedulerPermit};
