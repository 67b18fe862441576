//! Fault definitions
//!
//! A fault is described by a typed [`FaultConfig`] variant instead of an open
//! parameter map, so every parameter is checked once when the definition is
//! built (or loaded) rather than at injection time.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    entities::RecoveryConfig,
    errors::DomainError,
    value_objects::{FaultId, Severity},
};

/// Broad category of a fault, used to pick an injector and a blast-radius profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultCategory {
    /// Latency, partitions, packet loss
    Network,
    /// Error responses, unavailability, timeouts
    Service,
    /// Database and storage failures
    Data,
    /// CPU, memory and disk exhaustion
    Resource,
    /// Anything provided by a named custom injector
    Custom,
}

impl FaultCategory {
    /// Lowercase label
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Service => "service",
            Self::Data => "data",
            Self::Resource => "resource",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for FaultCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Typed parameters of a fault, one variant per fault kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
pub enum FaultConfig {
    /// Add delay to traffic reaching the target
    Latency {
        /// Fixed delay to add
        delay: Duration,
        /// Random variation on top of the delay
        #[serde(default)]
        jitter: Duration,
    },

    /// Cut traffic between the target and a set of peers
    Partition {
        /// Peers to isolate from; empty isolates the target entirely
        #[serde(default)]
        peers: Vec<String>,
        /// Whether traffic is cut in both directions
        #[serde(default = "default_true")]
        bidirectional: bool,
    },

    /// Drop a percentage of packets
    PacketLoss {
        /// Loss percentage (0-100]
        loss_percent: f64,
    },

    /// Answer a fraction of requests with an error
    ErrorInjection {
        /// Status code returned for failed requests
        status_code: u16,
        /// Fraction of requests that fail (0-1]
        error_rate: f64,
        /// Optional error body
        #[serde(default)]
        message: Option<String>,
    },

    /// Make the target completely unavailable
    Unavailability,

    /// Hang requests until they time out
    Timeout {
        /// How long requests hang before failing
        after: Duration,
    },

    /// Burn CPU on the target
    CpuExhaustion {
        /// Number of cores to load
        cores: u32,
        /// Load per core (0-100]
        load_percent: f64,
    },

    /// Allocate memory on the target
    MemoryExhaustion {
        /// Memory to consume in MB
        megabytes: u64,
    },

    /// Fill a filesystem on the target
    DiskExhaustion {
        /// Mount point or path to fill
        path: String,
        /// Target fill level (0-100]
        fill_percent: f64,
    },

    /// Fail database operations
    DatabaseFailure {
        /// Operation to fail (e.g. "write", "read", "connect")
        operation: String,
        /// Fraction of operations that fail (0-1]
        error_rate: f64,
    },

    /// Fail a storage volume
    StorageFailure {
        /// Volume identifier
        volume: String,
        /// Remount read-only instead of failing all I/O
        #[serde(default)]
        read_only: bool,
    },

    /// Fault handled by a named custom injector
    Custom {
        /// Injector name the fault is routed to
        name: String,
        /// Free-form parameters understood by that injector
        #[serde(default)]
        params: BTreeMap<String, serde_json::Value>,
    },
}

const fn default_true() -> bool {
    true
}

fn check_percent(field: &str, value: f64) -> Result<(), DomainError> {
    if value > 0.0 && value <= 100.0 {
        Ok(())
    } else {
        Err(DomainError::InvalidFaultConfig(format!(
            "{field} must be in (0, 100], got {value}"
        )))
    }
}

fn check_rate(field: &str, value: f64) -> Result<(), DomainError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(DomainError::InvalidFaultConfig(format!(
            "{field} must be in (0, 1], got {value}"
        )))
    }
}

fn check_non_empty(field: &str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        Err(DomainError::InvalidFaultConfig(format!(
            "{field} must not be empty"
        )))
    } else {
        Ok(())
    }
}

impl FaultConfig {
    /// Category this fault belongs to
    pub const fn category(&self) -> FaultCategory {
        match self {
            Self::Latency { .. } | Self::Partition { .. } | Self::PacketLoss { .. } => {
                FaultCategory::Network
            },
            Self::ErrorInjection { .. } | Self::Unavailability | Self::Timeout { .. } => {
                FaultCategory::Service
            },
            Self::DatabaseFailure { .. } | Self::StorageFailure { .. } => FaultCategory::Data,
            Self::CpuExhaustion { .. }
            | Self::MemoryExhaustion { .. }
            | Self::DiskExhaustion { .. } => FaultCategory::Resource,
            Self::Custom { .. } => FaultCategory::Custom,
        }
    }

    /// Snake-case name of the fault kind, matching the serialized tag
    pub fn type_name(&self) -> &str {
        match self {
            Self::Latency { .. } => "latency",
            Self::Partition { .. } => "partition",
            Self::PacketLoss { .. } => "packet_loss",
            Self::ErrorInjection { .. } => "error_injection",
            Self::Unavailability => "unavailability",
            Self::Timeout { .. } => "timeout",
            Self::CpuExhaustion { .. } => "cpu_exhaustion",
            Self::MemoryExhaustion { .. } => "memory_exhaustion",
            Self::DiskExhaustion { .. } => "disk_exhaustion",
            Self::DatabaseFailure { .. } => "database_failure",
            Self::StorageFailure { .. } => "storage_failure",
            Self::Custom { name, .. } => name,
        }
    }

    /// Check every parameter against its allowed range
    pub fn validate(&self) -> Result<(), DomainError> {
        match self {
            Self::Latency { delay, .. } => {
                if delay.is_zero() {
                    return Err(DomainError::InvalidFaultConfig(
                        "latency delay must be greater than zero".to_string(),
                    ));
                }
                Ok(())
            },
            Self::Partition { .. } | Self::Unavailability => Ok(()),
            Self::PacketLoss { loss_percent } => check_percent("loss_percent", *loss_percent),
            Self::ErrorInjection {
                status_code,
                error_rate,
                ..
            } => {
                if !(100..=599).contains(status_code) {
                    return Err(DomainError::InvalidFaultConfig(format!(
                        "status_code must be a valid HTTP status, got {status_code}"
                    )));
                }
                check_rate("error_rate", *error_rate)
            },
            Self::Timeout { after } => {
                if after.is_zero() {
                    return Err(DomainError::InvalidFaultConfig(
                        "timeout must be greater than zero".to_string(),
                    ));
                }
                Ok(())
            },
            Self::CpuExhaustion {
                cores,
                load_percent,
            } => {
                if *cores == 0 {
                    return Err(DomainError::InvalidFaultConfig(
                        "cores must be at least 1".to_string(),
                    ));
                }
                check_percent("load_percent", *load_percent)
            },
            Self::MemoryExhaustion { megabytes } => {
                if *megabytes == 0 {
                    return Err(DomainError::InvalidFaultConfig(
                        "megabytes must be greater than zero".to_string(),
                    ));
                }
                Ok(())
            },
            Self::DiskExhaustion { path, fill_percent } => {
                check_non_empty("path", path)?;
                check_percent("fill_percent", *fill_percent)
            },
            Self::DatabaseFailure {
                operation,
                error_rate,
            } => {
                check_non_empty("operation", operation)?;
                check_rate("error_rate", *error_rate)
            },
            Self::StorageFailure { volume, .. } => check_non_empty("volume", volume),
            Self::Custom { name, .. } => check_non_empty("name", name),
        }
    }
}

/// A single fault to inject as part of an experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultDefinition {
    /// Identifier, unique within the experiment
    pub id: FaultId,
    /// Typed fault parameters
    #[serde(flatten)]
    pub config: FaultConfig,
    /// How serious a failure caused by this fault is
    #[serde(default)]
    pub severity: Severity,
    /// How long the fault stays injected
    pub duration: Duration,
    /// Probability that the fault is injected when its turn comes (0-1]
    #[serde(default = "default_probability")]
    pub probability: f64,
    /// Disabled faults are never injected
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Fault-specific recovery settings, overriding the experiment's
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryConfig>,
}

const fn default_probability() -> f64 {
    1.0
}

impl FaultDefinition {
    /// Create a validated fault definition
    pub fn new(
        id: impl Into<FaultId>,
        config: FaultConfig,
        duration: Duration,
    ) -> Result<Self, DomainError> {
        let fault = Self {
            id: id.into(),
            config,
            severity: Severity::default(),
            duration,
            probability: default_probability(),
            enabled: true,
            recovery: None,
        };
        fault.validate()?;
        Ok(fault)
    }

    /// Set the severity
    #[must_use]
    pub const fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Set the injection probability
    ///
    /// The value is checked by [`FaultDefinition::validate`].
    #[must_use]
    pub const fn with_probability(mut self, probability: f64) -> Self {
        self.probability = probability;
        self
    }

    /// Enable or disable the fault
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Attach fault-specific recovery settings
    #[must_use]
    pub fn with_recovery(mut self, recovery: RecoveryConfig) -> Self {
        self.recovery = Some(recovery);
        self
    }

    /// Validate id, parameters, duration and probability
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.id.is_empty() {
            return Err(DomainError::InvalidFaultConfig(
                "fault id is required".to_string(),
            ));
        }
        if self.duration.is_zero() {
            return Err(DomainError::InvalidFaultConfig(format!(
                "fault '{}' duration must be greater than zero",
                self.id
            )));
        }
        check_rate("probability", self.probability)?;
        self.config.validate()
    }

    /// Category of the underlying fault
    pub const fn category(&self) -> FaultCategory {
        self.config.category()
    }

    /// Name of the fault kind
    pub fn type_name(&self) -> &str {
        self.config.type_name()
    }

    /// Whether a sampled value in [0, 1) selects this fault for injection
    pub fn is_selected(&self, sample: f64) -> bool {
        self.enabled && sample < self.probability
    }

    /// When the fault must be force-removed: the smaller of its own duration
    /// and the experiment timeout
    pub fn removal_deadline(&self, experiment_timeout: Duration) -> Duration {
        self.duration.min(experiment_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latency() -> FaultConfig {
        FaultConfig::Latency {
            delay: Duration::from_millis(200),
            jitter: Duration::from_millis(20),
        }
    }

    #[test]
    fn categories_follow_fault_kind() {
        assert_eq!(latency().category(), FaultCategory::Network);
        assert_eq!(FaultConfig::Unavailability.category(), FaultCategory::Service);
        assert_eq!(
            FaultConfig::MemoryExhaustion { megabytes: 512 }.category(),
            FaultCategory::Resource
        );
        assert_eq!(
            FaultConfig::StorageFailure {
                volume: "vol-1".to_string(),
                read_only: true
            }
            .category(),
            FaultCategory::Data
        );
    }

    #[test]
    fn new_rejects_out_of_range_parameters() {
        let result = FaultDefinition::new(
            "loss",
            FaultConfig::PacketLoss {
                loss_percent: 150.0,
            },
            Duration::from_secs(30),
        );
        assert!(matches!(result, Err(DomainError::InvalidFaultConfig(_))));
    }

    #[test]
    fn new_rejects_zero_duration() {
        let result = FaultDefinition::new("lat", latency(), Duration::ZERO);
        assert!(result.is_err());
    }

    #[test]
    fn new_rejects_nan_rates() {
        let result = FaultDefinition::new(
            "db",
            FaultConfig::DatabaseFailure {
                operation: "write".to_string(),
                error_rate: f64::NAN,
            },
            Duration::from_secs(10),
        );
        assert!(result.is_err());
    }

    #[test]
    fn validate_catches_bad_probability() {
        let fault = FaultDefinition::new("lat", latency(), Duration::from_secs(5))
            .unwrap()
            .with_probability(1.5);
        assert!(fault.validate().is_err());
    }

    #[test]
    fn disabled_fault_is_never_selected() {
        let fault = FaultDefinition::new("lat", latency(), Duration::from_secs(5))
            .unwrap()
            .with_enabled(false);
        assert!(!fault.is_selected(0.0));
    }

    #[test]
    fn probability_gates_selection() {
        let fault = FaultDefinition::new("lat", latency(), Duration::from_secs(5))
            .unwrap()
            .with_probability(0.5);
        assert!(fault.is_selected(0.25));
        assert!(!fault.is_selected(0.75));
    }

    #[test]
    fn removal_deadline_is_the_smaller_bound() {
        let fault = FaultDefinition::new("lat", latency(), Duration::from_secs(600)).unwrap();
        assert_eq!(
            fault.removal_deadline(Duration::from_secs(60)),
            Duration::from_secs(60)
        );
        assert_eq!(
            fault.removal_deadline(Duration::from_secs(3600)),
            Duration::from_secs(600)
        );
    }

    #[test]
    fn serialized_form_is_tagged() {
        let fault = FaultDefinition::new("lat", latency(), Duration::from_secs(5)).unwrap();
        let json = serde_json::to_value(&fault).unwrap();
        assert_eq!(json["type"], "latency");
        assert!(json["params"]["delay"].is_object());

        let back: FaultDefinition = serde_json::from_value(json).unwrap();
        assert_eq!(back, fault);
    }

    #[test]
    fn unit_variant_deserializes_without_params() {
        let json = serde_json::json!({
            "id": "down",
            "type": "unavailability",
            "duration": { "secs": 30, "nanos": 0 }
        });
        let fault: FaultDefinition = serde_json::from_value(json).unwrap();
        assert_eq!(fault.config, FaultConfig::Unavailability);
        assert!(fault.enabled);
        assert!((fault.probability - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn custom_type_name_is_injector_name() {
        let config = FaultConfig::Custom {
            name: "dns_poison".to_string(),
            params: BTreeMap::new(),
        };
        assert_eq!(config.type_name(), "dns_poison");
        assert_eq!(config.category(), FaultCategory::Custom);
    }
}
