//! Value objects - Immutable domain primitives

mod execution_phase;
mod experiment_id;
mod experiment_status;
mod fault_id;
mod priority;
mod severity;
mod target_scope;

pub use execution_phase::ExecutionPhase;
pub use experiment_id::ExperimentId;
pub use experiment_status::ExperimentStatus;
pub use fault_id::FaultId;
pub use priority::Priority;
pub use severity::Severity;
pub use target_scope::TargetScope;
