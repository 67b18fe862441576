//! Physical effects handed to a fault backend
//!
//! A [`FaultConfig`] says what the experiment wants; a [`FaultEffect`] is the
//! concrete directive after sampling and unit conversion.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use domain::entities::FaultConfig;
use domain::value_objects::{ExperimentId, FaultId};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Identity of one applied fault on a backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EffectHandle {
    pub experiment_id: ExperimentId,
    pub fault_id: FaultId,
}

impl EffectHandle {
    pub fn new(experiment_id: &ExperimentId, fault_id: &FaultId) -> Self {
        Self {
            experiment_id: experiment_id.clone(),
            fault_id: fault_id.clone(),
        }
    }
}

impl fmt::Display for EffectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.experiment_id, self.fault_id)
    }
}

/// Concrete perturbation applied to a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum FaultEffect {
    Delay {
        delay: Duration,
    },
    Drop {
        peers: Vec<String>,
        bidirectional: bool,
    },
    PacketLoss {
        /// 0-1
        ratio: f64,
    },
    ErrorResponses {
        status_code: u16,
        ratio: f64,
        body: Option<String>,
    },
    Block,
    Hang {
        after: Duration,
    },
    CpuLoad {
        cores: u32,
        /// 0-1 per core
        load: f64,
    },
    MemoryPressure {
        bytes: u64,
    },
    DiskFill {
        path: String,
        ratio: f64,
    },
    DatabaseErrors {
        operation: String,
        ratio: f64,
    },
    StorageFault {
        volume: String,
        read_only: bool,
    },
    Custom {
        name: String,
        params: BTreeMap<String, serde_json::Value>,
    },
}

impl FaultEffect {
    /// Shape a fault configuration into the effect to apply
    ///
    /// Latency jitter is sampled once per injection, uniformly in
    /// `[delay - jitter, delay + jitter]` and never below zero.
    pub fn from_config(config: &FaultConfig) -> Self {
        match config {
            FaultConfig::Latency { delay, jitter } => Self::Delay {
                delay: sample_delay(*delay, *jitter),
            },
            FaultConfig::Partition {
                peers,
                bidirectional,
            } => Self::Drop {
                peers: peers.clone(),
                bidirectional: *bidirectional,
            },
            FaultConfig::PacketLoss { loss_percent } => Self::PacketLoss {
                ratio: loss_percent / 100.0,
            },
            FaultConfig::ErrorInjection {
                status_code,
                error_rate,
                message,
            } => Self::ErrorResponses {
                status_code: *status_code,
                ratio: *error_rate,
                body: message.clone(),
            },
            FaultConfig::Unavailability => Self::Block,
            FaultConfig::Timeout { after } => Self::Hang { after: *after },
            FaultConfig::CpuExhaustion {
                cores,
                load_percent,
            } => Self::CpuLoad {
                cores: *cores,
                load: load_percent / 100.0,
            },
            FaultConfig::MemoryExhaustion { megabytes } => Self::MemoryPressure {
                bytes: megabytes.saturating_mul(1024 * 1024),
            },
            FaultConfig::DiskExhaustion { path, fill_percent } => Self::DiskFill {
                path: path.clone(),
                ratio: fill_percent / 100.0,
            },
            FaultConfig::DatabaseFailure {
                operation,
                error_rate,
            } => Self::DatabaseErrors {
                operation: operation.clone(),
                ratio: *error_rate,
            },
            FaultConfig::StorageFailure { volume, read_only } => Self::StorageFault {
                volume: volume.clone(),
                read_only: *read_only,
            },
            FaultConfig::Custom { name, params } => Self::Custom {
                name: name.clone(),
                params: params.clone(),
            },
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Delay { .. } => "delay",
            Self::Drop { .. } => "drop",
            Self::PacketLoss { .. } => "packet_loss",
            Self::ErrorResponses { .. } => "error_responses",
            Self::Block => "block",
            Self::Hang { .. } => "hang",
            Self::CpuLoad { .. } => "cpu_load",
            Self::MemoryPressure { .. } => "memory_pressure",
            Self::DiskFill { .. } => "disk_fill",
            Self::DatabaseErrors { .. } => "database_errors",
            Self::StorageFault { .. } => "storage_fault",
            Self::Custom { .. } => "custom",
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn sample_delay(delay: Duration, jitter: Duration) -> Duration {
    if jitter.is_zero() {
        return delay;
    }
    let base = delay.as_millis() as i128;
    let spread = jitter.as_millis() as i128;
    let offset = rand::rng().random_range(-spread..=spread);
    Duration::from_millis((base + offset).max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_without_jitter_is_exact() {
        let effect = FaultEffect::from_config(&FaultConfig::Latency {
            delay: Duration::from_millis(250),
            jitter: Duration::ZERO,
        });
        assert_eq!(
            effect,
            FaultEffect::Delay {
                delay: Duration::from_millis(250)
            }
        );
    }

    #[test]
    fn latency_jitter_stays_in_range() {
        let config = FaultConfig::Latency {
            delay: Duration::from_millis(100),
            jitter: Duration::from_millis(150),
        };
        for _ in 0..200 {
            let FaultEffect::Delay { delay } = FaultEffect::from_config(&config) else {
                panic!("expected a delay effect");
            };
            assert!(delay <= Duration::from_millis(250));
        }
    }

    #[test]
    fn percentages_become_ratios() {
        let loss = FaultEffect::from_config(&FaultConfig::PacketLoss { loss_percent: 25.0 });
        assert_eq!(loss, FaultEffect::PacketLoss { ratio: 0.25 });

        let cpu = FaultEffect::from_config(&FaultConfig::CpuExhaustion {
            cores: 2,
            load_percent: 80.0,
        });
        assert_eq!(cpu, FaultEffect::CpuLoad { cores: 2, load: 0.8 });
    }

    #[test]
    fn memory_is_converted_to_bytes() {
        let effect = FaultEffect::from_config(&FaultConfig::MemoryExhaustion { megabytes: 2 });
        assert_eq!(effect, FaultEffect::MemoryPressure { bytes: 2_097_152 });
        assert_eq!(effect.kind(), "memory_pressure");
    }

    #[test]
    fn handle_display() {
        let handle = EffectHandle::new(&ExperimentId::new("exp-1"), &FaultId::new("f1"));
        assert_eq!(handle.to_string(), "exp-1/f1");
    }
}
