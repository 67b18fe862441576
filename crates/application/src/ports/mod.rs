//! Port definitions for application layer
//!
//! Ports are interfaces that define how the application interacts with
//! external systems. Adapters in the infrastructure layer implement these ports.

mod experiment_store_port;
mod fault_injector_port;
mod health_check_port;
mod metrics_source_port;
mod region_runner_port;
mod report_sink_port;

#[cfg(test)]
pub use experiment_store_port::MockExperimentStorePort;
pub use experiment_store_port::{ExperimentQuery, ExperimentStorePort};
#[cfg(test)]
pub use fault_injector_port::MockFaultInjectorPort;
pub use fault_injector_port::{FaultInjectorPort, FaultStatus};
pub use health_check_port::HealthCheckPort;
#[cfg(test)]
pub use health_check_port::MockHealthCheckPort;
pub use metrics_source_port::MetricsSourcePort;
#[cfg(test)]
pub use metrics_source_port::MockMetricsSourcePort;
#[cfg(test)]
pub use region_runner_port::MockRegionRunner;
pub use region_runner_port::RegionRunner;
#[cfg(test)]
pub use report_sink_port::MockReportSinkPort;
pub use report_sink_port::{ReportSinkPort, ResilienceReport};
