//! Target scope value object

use std::fmt;

use serde::{Deserialize, Serialize};

/// How much of the infrastructure a target spans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TargetScope {
    /// A single instance (pod, process, host)
    #[default]
    SingleInstance,
    /// A subset of instances selected by labels
    Multiple,
    /// Every instance of a cluster
    Cluster,
    /// An entire region
    Region,
}

impl TargetScope {
    /// Whether policy thresholds for wide targets apply
    ///
    /// Cluster and region scoped targets are checked against the stricter
    /// blast-radius limit.
    pub const fn is_wide(&self) -> bool {
        matches!(self, Self::Cluster | Self::Region)
    }

    /// Lowercase label
    pub const fn label(&self) -> &'static str {
        match self {
            Self::SingleInstance => "single_instance",
            Self::Multiple => "multiple",
            Self::Cluster => "cluster",
            Self::Region => "region",
        }
    }
}

impl fmt::Display for TargetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_and_region_are_wide() {
        assert!(TargetScope::Cluster.is_wide());
        assert!(TargetScope::Region.is_wide());
        assert!(!TargetScope::SingleInstance.is_wide());
        assert!(!TargetScope::Multiple.is_wide());
    }
}
