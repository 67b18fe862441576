//! Experiment registry
//!
//! Owned, shared state for every experiment known to an orchestrator
//! instance. Writes (status transitions, phase and fault bookkeeping) take
//! the write lock; progress and listing queries share the read lock.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use domain::entities::{Experiment, ExperimentResults};
use domain::value_objects::{ExecutionPhase, ExperimentId, ExperimentStatus, FaultId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::cancellation::CancellationToken;
use crate::error::ApplicationError;

/// Snapshot of a running or finished experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentProgress {
    pub experiment_id: ExperimentId,
    pub status: ExperimentStatus,
    pub current_phase: Option<ExecutionPhase>,
    pub completed_phases: Vec<ExecutionPhase>,
    pub active_faults: Vec<FaultId>,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed: Duration,
    /// Share of phases completed, 100 once terminal
    pub percent_complete: f64,
}

#[derive(Debug)]
struct Entry {
    experiment: Experiment,
    current_phase: Option<ExecutionPhase>,
    completed_phases: Vec<ExecutionPhase>,
    active_faults: Vec<FaultId>,
    cancel: CancellationToken,
}

impl Entry {
    #[allow(clippy::cast_precision_loss)]
    fn progress(&self) -> ExperimentProgress {
        let status = self.experiment.status;
        let elapsed = match (self.experiment.started_at, self.experiment.completed_at) {
            (Some(start), Some(end)) => (end - start).to_std().unwrap_or_default(),
            (Some(start), None) => (Utc::now() - start).to_std().unwrap_or_default(),
            _ => Duration::ZERO,
        };
        let percent_complete = if status.is_terminal() {
            100.0
        } else {
            self.completed_phases.len() as f64 / ExecutionPhase::all().len() as f64 * 100.0
        };
        ExperimentProgress {
            experiment_id: self.experiment.id.clone(),
            status,
            current_phase: self.current_phase,
            completed_phases: self.completed_phases.clone(),
            active_faults: self.active_faults.clone(),
            started_at: self.experiment.started_at,
            elapsed,
            percent_complete,
        }
    }
}

/// Registry of experiments keyed by id
#[derive(Debug, Default)]
pub struct ExperimentRegistry {
    entries: RwLock<HashMap<ExperimentId, Entry>>,
}

impl ExperimentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an experiment with a fresh cancellation token
    pub fn insert(&self, experiment: Experiment) -> Result<CancellationToken, ApplicationError> {
        self.insert_with_token(experiment, CancellationToken::new())
    }

    /// Register an experiment with a caller-provided cancellation token
    pub fn insert_with_token(
        &self,
        experiment: Experiment,
        cancel: CancellationToken,
    ) -> Result<CancellationToken, ApplicationError> {
        let mut entries = self.entries.write();
        if entries.contains_key(&experiment.id) {
            return Err(ApplicationError::Validation(format!(
                "experiment '{}' already exists",
                experiment.id
            )));
        }
        entries.insert(
            experiment.id.clone(),
            Entry {
                experiment,
                current_phase: None,
                completed_phases: Vec::new(),
                active_faults: Vec::new(),
                cancel: cancel.clone(),
            },
        );
        Ok(cancel)
    }

    pub fn contains(&self, id: &ExperimentId) -> bool {
        self.entries.read().contains_key(id)
    }

    pub fn get(&self, id: &ExperimentId) -> Option<Experiment> {
        self.entries.read().get(id).map(|e| e.experiment.clone())
    }

    pub fn progress(&self, id: &ExperimentId) -> Option<ExperimentProgress> {
        self.entries.read().get(id).map(Entry::progress)
    }

    pub fn cancel_token(&self, id: &ExperimentId) -> Option<CancellationToken> {
        self.entries.read().get(id).map(|e| e.cancel.clone())
    }

    /// All experiments, oldest first
    pub fn list(&self) -> Vec<Experiment> {
        let mut experiments: Vec<_> = self
            .entries
            .read()
            .values()
            .map(|e| e.experiment.clone())
            .collect();
        experiments.sort_by_key(|e| e.created_at);
        experiments
    }

    /// Apply a status transition; unknown ids are ignored
    pub fn transition(
        &self,
        id: &ExperimentId,
        status: ExperimentStatus,
    ) -> Result<(), ApplicationError> {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(id) {
            entry.experiment.transition_to(status)?;
            if status.is_terminal() {
                entry.current_phase = None;
            }
        }
        Ok(())
    }

    /// Store the final results; the status comes from the results
    pub fn complete(
        &self,
        id: &ExperimentId,
        results: &ExperimentResults,
    ) -> Result<(), ApplicationError> {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(id) {
            entry.experiment.complete(results.clone())?;
            entry.current_phase = None;
            entry.active_faults.clear();
        }
        Ok(())
    }

    pub fn enter_phase(&self, id: &ExperimentId, phase: ExecutionPhase) {
        if let Some(entry) = self.entries.write().get_mut(id) {
            entry.current_phase = Some(phase);
        }
    }

    pub fn finish_phase(&self, id: &ExperimentId, phase: ExecutionPhase) {
        if let Some(entry) = self.entries.write().get_mut(id) {
            if !entry.completed_phases.contains(&phase) {
                entry.completed_phases.push(phase);
            }
        }
    }

    pub fn set_fault_active(&self, id: &ExperimentId, fault_id: &FaultId, active: bool) {
        if let Some(entry) = self.entries.write().get_mut(id) {
            entry.active_faults.retain(|f| f != fault_id);
            if active {
                entry.active_faults.push(fault_id.clone());
            }
        }
    }

    /// Drop a terminal experiment from the registry
    pub fn remove(&self, id: &ExperimentId) -> Option<Experiment> {
        let mut entries = self.entries.write();
        match entries.get(id) {
            Some(entry) if entry.experiment.status.is_terminal() => {
                entries.remove(id).map(|e| e.experiment)
            },
            _ => None,
        }
    }

    /// Drop every terminal experiment that finished before `cutoff`
    ///
    /// Returns the number of entries removed.
    pub fn prune_terminal(&self, cutoff: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| {
            let experiment = &entry.experiment;
            !(experiment.status.is_terminal()
                && experiment.completed_at.is_some_and(|at| at < cutoff))
        });
        before - entries.len()
    }
}
