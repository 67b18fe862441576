//! Infrastructure layer - adapters for the chaos engine
//!
//! Fault injectors over a pluggable backend, HTTP health checks and metrics,
//! SQLite persistence, layered configuration and tracing setup.

pub mod bootstrap;
pub mod config;
pub mod health;
pub mod injectors;
pub mod persistence;
pub mod report;
pub mod retry;
pub mod telemetry;

pub use bootstrap::{build_orchestrator, build_recovery_validator, open_store};
pub use config::{AppConfig, ConfigError, DatabaseConfig, Environment};
pub use health::{HttpCheckSettings, HttpHealthCheck, HttpMetricsSource, MetricsSourceSettings};
pub use injectors::{
    BackendError, BackendInjector, FaultBackend, FaultEffect, SimulatedBackend, default_registry,
    register_custom,
};
pub use persistence::{ConnectionPool, DatabaseError, SqliteExperimentStore, create_pool};
pub use report::TracingReportSink;
pub use retry::{RetryConfig, RetryResult, Retryable, retry, with_retry};
pub use telemetry::{TelemetryConfig, TelemetryError, init_tracing};
