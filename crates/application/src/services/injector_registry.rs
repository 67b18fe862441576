//! Fault injector registry
//!
//! One injector per fault category, plus named injectors. A named injector
//! matching a fault's type name takes precedence over the category injector;
//! custom faults are only ever routed by name.

use std::collections::HashMap;
use std::sync::Arc;

use domain::entities::{FaultCategory, FaultDefinition};

use crate::ports::FaultInjectorPort;

/// Registry of fault injectors
#[derive(Clone, Default)]
pub struct InjectorRegistry {
    by_category: HashMap<FaultCategory, Arc<dyn FaultInjectorPort>>,
    named: HashMap<String, Arc<dyn FaultInjectorPort>>,
}

impl std::fmt::Debug for InjectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut categories: Vec<_> = self.by_category.keys().map(FaultCategory::label).collect();
        categories.sort_unstable();
        let mut named: Vec<_> = self.named.keys().collect();
        named.sort();
        f.debug_struct("InjectorRegistry")
            .field("categories", &categories)
            .field("named", &named)
            .finish()
    }
}

impl InjectorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the injector for a category, replacing any previous one
    #[must_use]
    pub fn with_category(
        mut self,
        category: FaultCategory,
        injector: Arc<dyn FaultInjectorPort>,
    ) -> Self {
        self.by_category.insert(category, injector);
        self
    }

    /// Register an injector under a fault type name
    #[must_use]
    pub fn with_named(mut self, name: impl Into<String>, injector: Arc<dyn FaultInjectorPort>) -> Self {
        self.named.insert(name.into(), injector);
        self
    }

    /// Injector responsible for a fault, if any
    pub fn resolve(&self, fault: &FaultDefinition) -> Option<Arc<dyn FaultInjectorPort>> {
        if let Some(injector) = self.named.get(fault.type_name()) {
            return Some(Arc::clone(injector));
        }
        match fault.category() {
            FaultCategory::Custom => None,
            category => self.by_category.get(&category).map(Arc::clone),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_category.is_empty() && self.named.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use domain::entities::FaultConfig;

    use super::*;
    use crate::ports::MockFaultInjectorPort;

    fn fault(config: FaultConfig) -> FaultDefinition {
        FaultDefinition::new("f1", config, Duration::from_secs(10)).unwrap()
    }

    fn injector() -> Arc<dyn FaultInjectorPort> {
        Arc::new(MockFaultInjectorPort::new())
    }

    #[test]
    fn resolves_by_category() {
        let network = injector();
        let registry = InjectorRegistry::new().with_category(FaultCategory::Network, Arc::clone(&network));

        let resolved = registry
            .resolve(&fault(FaultConfig::PacketLoss { loss_percent: 10.0 }))
            .unwrap();
        assert!(Arc::ptr_eq(&resolved, &network));
        assert!(registry.resolve(&fault(FaultConfig::Unavailability)).is_none());
    }

    #[test]
    fn named_injector_overrides_category() {
        let network = injector();
        let special = injector();
        let registry = InjectorRegistry::new()
            .with_category(FaultCategory::Network, network)
            .with_named("partition", Arc::clone(&special));

        let resolved = registry
            .resolve(&fault(FaultConfig::Partition {
                peers: vec![],
                bidirectional: true,
            }))
            .unwrap();
        assert!(Arc::ptr_eq(&resolved, &special));
    }

    #[test]
    fn custom_faults_route_by_name_only() {
        let custom = injector();
        let registry = InjectorRegistry::new()
            .with_category(FaultCategory::Custom, injector())
            .with_named("dns_poison", Arc::clone(&custom));

        let dns = fault(FaultConfig::Custom {
            name: "dns_poison".to_string(),
            params: BTreeMap::new(),
        });
        assert!(Arc::ptr_eq(&registry.resolve(&dns).unwrap(), &custom));

        let unknown = fault(FaultConfig::Custom {
            name: "clock_skew".to_string(),
            params: BTreeMap::new(),
        });
        assert!(registry.resolve(&unknown).is_none());
    }
}
