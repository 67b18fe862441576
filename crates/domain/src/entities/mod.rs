//! Domain entities - Objects with identity and lifecycle

mod blast_radius;
mod experiment;
mod fault;
mod observation;
mod policy;
mod recovery;
mod results;
mod target;

pub use blast_radius::{BlastRadius, BlastRadiusImpact, ImpactScope};
pub use experiment::{Experiment, InjectionFailurePolicy};
pub use fault::{FaultCategory, FaultConfig, FaultDefinition};
pub use observation::{Observation, ObservationKind};
pub use policy::{PolicyAction, PolicyRule, PolicyViolation, RuleCondition, SafetyPolicy};
pub use recovery::{RecoveryConfig, RecoveryResult};
pub use results::{ExperimentResults, Failure, FailureKind, ImpactSummary};
pub use target::Target;
