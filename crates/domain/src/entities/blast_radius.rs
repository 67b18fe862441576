//! Blast radius classification

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::value_objects::Severity;

/// Part of the system an experiment can impact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactScope {
    Network,
    Service,
    Data,
    Infrastructure,
}

impl ImpactScope {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Service => "service",
            Self::Data => "data",
            Self::Infrastructure => "infrastructure",
        }
    }
}

impl fmt::Display for ImpactScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What the experiment touches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlastRadiusImpact {
    pub target_name: String,
    pub fault_type: String,
    pub duration: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Estimated scope and severity of an experiment's potential impact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlastRadius {
    pub scope: ImpactScope,
    pub severity: Severity,
    pub impact: BlastRadiusImpact,
}
