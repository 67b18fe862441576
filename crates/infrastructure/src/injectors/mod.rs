//! Fault injectors over a pluggable backend
//!
//! Every built-in category gets its own [`BackendInjector`] sharing one
//! [`FaultBackend`]. Custom faults are routed by name and need an explicit
//! registration via [`register_custom`].

mod active_faults;
mod backend;
mod effects;
mod injector;

use std::sync::Arc;

use application::InjectorRegistry;
use domain::entities::FaultCategory;

pub use active_faults::{ActiveFault, ActiveFaultTable};
#[cfg(test)]
pub use backend::MockFaultBackend;
pub use backend::{AppliedEffect, BackendError, FaultBackend, SimulatedBackend, SimulatedStats};
pub use effects::{EffectHandle, FaultEffect};
pub use injector::BackendInjector;

use crate::retry::RetryConfig;

const BUILT_IN: [FaultCategory; 4] = [
    FaultCategory::Network,
    FaultCategory::Service,
    FaultCategory::Data,
    FaultCategory::Resource,
];

/// Registry with one injector per built-in category on `backend`
pub fn default_registry(backend: &Arc<dyn FaultBackend>, retry: &RetryConfig) -> InjectorRegistry {
    BUILT_IN
        .into_iter()
        .fold(InjectorRegistry::new(), |registry, category| {
            registry.with_category(
                category,
                Arc::new(BackendInjector::new(category, Arc::clone(backend), retry.clone())),
            )
        })
}

/// Route custom faults named `name` to `backend`
pub fn register_custom(
    registry: InjectorRegistry,
    name: impl Into<String>,
    backend: &Arc<dyn FaultBackend>,
    retry: &RetryConfig,
) -> InjectorRegistry {
    registry.with_named(
        name,
        Arc::new(BackendInjector::new(
            FaultCategory::Custom,
            Arc::clone(backend),
            retry.clone(),
        )),
    )
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use domain::entities::{FaultConfig, FaultDefinition, Target};
    use domain::value_objects::ExperimentId;

    use super::*;

    fn fault(config: FaultConfig) -> FaultDefinition {
        FaultDefinition::new("f1", config, Duration::from_secs(30)).unwrap()
    }

    #[test]
    fn every_built_in_category_resolves() {
        let backend: Arc<dyn FaultBackend> = Arc::new(SimulatedBackend::new());
        let registry = default_registry(&backend, &RetryConfig::none());

        for config in [
            FaultConfig::PacketLoss { loss_percent: 10.0 },
            FaultConfig::Unavailability,
            FaultConfig::DatabaseFailure {
                operation: "write".into(),
                error_rate: 0.5,
            },
            FaultConfig::CpuExhaustion {
                cores: 1,
                load_percent: 50.0,
            },
        ] {
            assert!(registry.resolve(&fault(config)).is_some());
        }
    }

    #[test]
    fn custom_faults_need_registration() {
        let backend: Arc<dyn FaultBackend> = Arc::new(SimulatedBackend::new());
        let custom = fault(FaultConfig::Custom {
            name: "clock-skew".into(),
            params: BTreeMap::new(),
        });

        let registry = default_registry(&backend, &RetryConfig::none());
        assert!(registry.resolve(&custom).is_none());

        let registry = register_custom(registry, "clock-skew", &backend, &RetryConfig::none());
        assert!(registry.resolve(&custom).is_some());
    }

    #[tokio::test]
    async fn categories_share_the_backend() {
        let simulated = Arc::new(SimulatedBackend::new());
        let backend: Arc<dyn FaultBackend> = simulated.clone();
        let registry = default_registry(&backend, &RetryConfig::none());
        let target = Target::new("service", "api");
        let exp = ExperimentId::new("exp-1");

        let net = FaultDefinition::new("net", FaultConfig::Unavailability, Duration::from_secs(5)).unwrap();
        let res = FaultDefinition::new("res", FaultConfig::MemoryExhaustion { megabytes: 64 }, Duration::from_secs(5))
            .unwrap();
        for f in [&net, &res] {
            registry.resolve(f).unwrap().inject(&exp, f, &target).await.unwrap();
        }

        assert_eq!(simulated.applied().len(), 2);
    }
}
