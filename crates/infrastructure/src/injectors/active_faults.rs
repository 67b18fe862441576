//! Table of faults an injector currently has applied

use std::collections::HashMap;
use std::time::Duration;

use application::ports::FaultStatus;
use chrono::{DateTime, Utc};
use domain::value_objects::ExperimentId;
use parking_lot::RwLock;
use tokio::time::Instant;

use super::effects::{EffectHandle, FaultEffect};

/// One applied fault
#[derive(Debug, Clone)]
pub struct ActiveFault {
    pub effect: FaultEffect,
    pub target: String,
    pub started_at: DateTime<Utc>,
    started: Instant,
    duration: Duration,
}

impl ActiveFault {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn status(&self) -> FaultStatus {
        let elapsed = self.elapsed();
        FaultStatus {
            active: true,
            started_at: Some(self.started_at),
            elapsed,
            remaining: self.duration.saturating_sub(elapsed),
        }
    }
}

/// Active faults keyed by (experiment, fault)
///
/// Inserting an existing key replaces the entry, so re-injection never
/// produces a duplicate.
#[derive(Debug, Default)]
pub struct ActiveFaultTable {
    entries: RwLock<HashMap<EffectHandle, ActiveFault>>,
}

impl ActiveFaultTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an applied fault, returning whether it replaced an entry
    pub fn insert(
        &self,
        handle: EffectHandle,
        effect: FaultEffect,
        target: impl Into<String>,
        duration: Duration,
    ) -> bool {
        let entry = ActiveFault {
            effect,
            target: target.into(),
            started_at: Utc::now(),
            started: Instant::now(),
            duration,
        };
        self.entries.write().insert(handle, entry).is_some()
    }

    pub fn remove(&self, handle: &EffectHandle) -> Option<ActiveFault> {
        self.entries.write().remove(handle)
    }

    pub fn get(&self, handle: &EffectHandle) -> Option<ActiveFault> {
        self.entries.read().get(handle).cloned()
    }

    pub fn contains(&self, handle: &EffectHandle) -> bool {
        self.entries.read().contains_key(handle)
    }

    /// Status of a fault; unknown handles are inactive
    pub fn status(&self, handle: &EffectHandle) -> FaultStatus {
        self.entries
            .read()
            .get(handle)
            .map_or_else(FaultStatus::inactive, ActiveFault::status)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Handles belonging to one experiment
    pub fn handles_for(&self, experiment_id: &ExperimentId) -> Vec<EffectHandle> {
        let mut handles: Vec<_> = self
            .entries
            .read()
            .keys()
            .filter(|h| &h.experiment_id == experiment_id)
            .cloned()
            .collect();
        handles.sort();
        handles
    }
}

#[cfg(test)]
mod tests {
    use domain::value_objects::FaultId;

    use super::*;

    fn handle(exp: &str, fault: &str) -> EffectHandle {
        EffectHandle::new(&ExperimentId::new(exp), &FaultId::new(fault))
    }

    #[test]
    fn unknown_fault_is_inactive() {
        let table = ActiveFaultTable::new();
        assert_eq!(table.status(&handle("e", "f")), FaultStatus::inactive());
        assert!(table.remove(&handle("e", "f")).is_none());
    }

    #[test]
    fn reinsert_replaces_entry() {
        let table = ActiveFaultTable::new();
        let h = handle("e", "f");
        assert!(!table.insert(h.clone(), FaultEffect::Block, "api", Duration::from_secs(60)));
        assert!(table.insert(h.clone(), FaultEffect::Block, "api", Duration::from_secs(60)));
        assert_eq!(table.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn status_tracks_elapsed_and_remaining() {
        let table = ActiveFaultTable::new();
        let h = handle("e", "f");
        table.insert(h.clone(), FaultEffect::Block, "api", Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(20)).await;

        let status = table.status(&h);
        assert!(status.active);
        assert!(status.started_at.is_some());
        assert_eq!(status.elapsed, Duration::from_secs(20));
        assert_eq!(status.remaining, Duration::from_secs(40));
    }

    #[test]
    fn handles_are_scoped_to_experiment() {
        let table = ActiveFaultTable::new();
        table.insert(handle("a", "f2"), FaultEffect::Block, "api", Duration::from_secs(1));
        table.insert(handle("a", "f1"), FaultEffect::Block, "api", Duration::from_secs(1));
        table.insert(handle("b", "f1"), FaultEffect::Block, "api", Duration::from_secs(1));

        let handles = table.handles_for(&ExperimentId::new("a"));
        assert_eq!(handles, vec![handle("a", "f1"), handle("a", "f2")]);
    }
}
