//! Fault backend seam
//!
//! Injectors track which faults are active; a [`FaultBackend`] does the
//! actual perturbing. [`SimulatedBackend`] only records what it was asked to
//! do and can be told to fail, which is what dry runs and tests need.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::entities::Target;
#[cfg(test)]
use mockall::automock;
use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::effects::{EffectHandle, FaultEffect};
use crate::retry::Retryable;

/// Errors raised by a fault backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The backend could not be reached
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// The backend did not answer in time
    #[error("backend timed out after {0:?}")]
    Timeout(Duration),

    /// The backend understood the request and refused it
    #[error("backend rejected request: {0}")]
    Rejected(String),
}

impl Retryable for BackendError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Timeout(_))
    }
}

/// Applies and reverts physical fault effects
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FaultBackend: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Apply `effect` to `target`; applying the same handle twice replaces it
    async fn apply(
        &self,
        handle: &EffectHandle,
        target: &Target,
        effect: &FaultEffect,
    ) -> Result<(), BackendError>;

    /// Lift the effect applied under `handle`
    async fn revert(&self, handle: &EffectHandle, target: &Target) -> Result<(), BackendError>;
}

/// One effect held by the simulated backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedEffect {
    pub handle: EffectHandle,
    pub target: String,
    pub effect: FaultEffect,
    pub applied_at: DateTime<Utc>,
}

/// Call counters of a [`SimulatedBackend`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedStats {
    pub applies: u64,
    pub reverts: u64,
    pub failed_applies: u64,
    pub failed_reverts: u64,
}

/// In-memory backend that records effects instead of applying them
#[derive(Debug, Default)]
pub struct SimulatedBackend {
    applied: RwLock<HashMap<EffectHandle, AppliedEffect>>,
    latency: Option<Duration>,
    error_rate: f64,
    fail_applies: AtomicU32,
    fail_reverts: AtomicU32,
    applies: AtomicU64,
    reverts: AtomicU64,
    failed_applies: AtomicU64,
    failed_reverts: AtomicU64,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail this fraction of apply calls at random (0-1)
    #[must_use]
    pub const fn with_error_rate(mut self, rate: f64) -> Self {
        self.error_rate = rate;
        self
    }

    /// Make the next `count` apply calls fail as unreachable
    pub fn fail_next_applies(&self, count: u32) {
        self.fail_applies.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` revert calls fail as unreachable
    pub fn fail_next_reverts(&self, count: u32) {
        self.fail_reverts.store(count, Ordering::SeqCst);
    }

    pub fn is_applied(&self, handle: &EffectHandle) -> bool {
        self.applied.read().contains_key(handle)
    }

    /// Currently applied effects, ordered by handle
    pub fn applied(&self) -> Vec<AppliedEffect> {
        let mut effects: Vec<_> = self.applied.read().values().cloned().collect();
        effects.sort_by(|a, b| a.handle.cmp(&b.handle));
        effects
    }

    pub fn stats(&self) -> SimulatedStats {
        SimulatedStats {
            applies: self.applies.load(Ordering::Relaxed),
            reverts: self.reverts.load(Ordering::Relaxed),
            failed_applies: self.failed_applies.load(Ordering::Relaxed),
            failed_reverts: self.failed_reverts.load(Ordering::Relaxed),
        }
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

/// Decrement a fail-next counter, returning whether this call should fail
fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl FaultBackend for SimulatedBackend {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn apply(
        &self,
        handle: &EffectHandle,
        target: &Target,
        effect: &FaultEffect,
    ) -> Result<(), BackendError> {
        self.pause().await;
        self.applies.fetch_add(1, Ordering::Relaxed);

        let random_failure = self.error_rate > 0.0 && rand::rng().random::<f64>() < self.error_rate;
        if take_failure(&self.fail_applies) || random_failure {
            self.failed_applies.fetch_add(1, Ordering::Relaxed);
            return Err(BackendError::Unreachable(format!(
                "simulated failure applying {handle}"
            )));
        }

        debug!(handle = %handle, target = %target.name, effect = effect.kind(), "simulated effect applied");
        self.applied.write().insert(
            handle.clone(),
            AppliedEffect {
                handle: handle.clone(),
                target: target.name.clone(),
                effect: effect.clone(),
                applied_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn revert(&self, handle: &EffectHandle, target: &Target) -> Result<(), BackendError> {
        self.pause().await;
        self.reverts.fetch_add(1, Ordering::Relaxed);

        if take_failure(&self.fail_reverts) {
            self.failed_reverts.fetch_add(1, Ordering::Relaxed);
            return Err(BackendError::Unreachable(format!(
                "simulated failure reverting {handle}"
            )));
        }

        debug!(handle = %handle, target = %target.name, "simulated effect reverted");
        self.applied.write().remove(handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use domain::value_objects::{ExperimentId, FaultId};

    use super::*;

    fn handle(fault: &str) -> EffectHandle {
        EffectHandle::new(&ExperimentId::new("exp-1"), &FaultId::new(fault))
    }

    fn target() -> Target {
        Target::new("service", "checkout")
    }

    #[tokio::test]
    async fn apply_and_revert_are_recorded() {
        let backend = SimulatedBackend::new();
        backend
            .apply(&handle("f1"), &target(), &FaultEffect::Block)
            .await
            .unwrap();
        assert!(backend.is_applied(&handle("f1")));
        assert_eq!(backend.applied()[0].target, "checkout");

        backend.revert(&handle("f1"), &target()).await.unwrap();
        assert!(!backend.is_applied(&handle("f1")));
        assert_eq!(
            backend.stats(),
            SimulatedStats {
                applies: 1,
                reverts: 1,
                ..SimulatedStats::default()
            }
        );
    }

    #[tokio::test]
    async fn reapply_replaces_effect() {
        let backend = SimulatedBackend::new();
        let first = FaultEffect::Delay {
            delay: Duration::from_millis(100),
        };
        let second = FaultEffect::Delay {
            delay: Duration::from_millis(300),
        };
        backend.apply(&handle("f1"), &target(), &first).await.unwrap();
        backend.apply(&handle("f1"), &target(), &second).await.unwrap();

        let applied = backend.applied();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].effect, second);
    }

    #[tokio::test]
    async fn fail_next_counts_down() {
        let backend = SimulatedBackend::new();
        backend.fail_next_applies(2);

        for _ in 0..2 {
            let err = backend
                .apply(&handle("f1"), &target(), &FaultEffect::Block)
                .await
                .unwrap_err();
            assert!(err.is_retryable());
        }
        backend
            .apply(&handle("f1"), &target(), &FaultEffect::Block)
            .await
            .unwrap();
        assert_eq!(backend.stats().failed_applies, 2);
    }

    #[tokio::test]
    async fn full_error_rate_always_fails() {
        let backend = SimulatedBackend::new().with_error_rate(1.0);
        assert!(
            backend
                .apply(&handle("f1"), &target(), &FaultEffect::Block)
                .await
                .is_err()
        );
        assert!(backend.applied().is_empty());
    }

    #[test]
    fn rejected_is_not_retryable() {
        assert!(!BackendError::Rejected("unsupported".into()).is_retryable());
        assert!(BackendError::Timeout(Duration::from_secs(1)).is_retryable());
    }
}
