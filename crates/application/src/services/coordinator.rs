//! Multi-region coordination
//!
//! Fans one experiment definition out over named regions through a
//! [`RegionRunner`] and aggregates the per-region outcomes. Each regional run
//! gets its own experiment id (`{id}-{region}`, plus `-s{n}` per pipeline
//! stage), so regions never share registry entries or fault tables.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use domain::entities::{Experiment, ExperimentResults};
use domain::value_objects::{ExperimentId, ExperimentStatus};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crate::cancellation::CancellationToken;
use crate::error::ApplicationError;
use crate::ports::RegionRunner;
use crate::services::resilience_scorer::calculate_resilience_score;

/// How regional runs relate in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationMode {
    /// One region after another
    #[default]
    Sequential,
    /// All regions at once
    Parallel,
    /// One fault per stage; every region finishes a stage before the next
    Pipelined,
    /// Sequential, with each region gated on earlier outcomes
    Conditional,
}

impl fmt::Display for CoordinationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::Pipelined => "pipelined",
            Self::Conditional => "conditional",
        };
        write!(f, "{label}")
    }
}

/// Aggregate policy for a distributed run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinationPolicy {
    #[serde(default)]
    pub mode: CoordinationMode,
    /// Stop launching (and cancel in-flight parallel) runs after a failure
    #[serde(default)]
    pub stop_on_failure: bool,
}

impl CoordinationPolicy {
    #[must_use]
    pub const fn new(mode: CoordinationMode) -> Self {
        Self {
            mode,
            stop_on_failure: false,
        }
    }

    #[must_use]
    pub const fn stop_on_failure(mut self) -> Self {
        self.stop_on_failure = true;
        self
    }
}

/// Gate evaluated against the outcomes of earlier regions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "condition", content = "value", rename_all = "snake_case")]
pub enum GateCondition {
    AllPreviousSucceeded,
    AnyPreviousSucceeded,
    /// Every scored earlier region reached at least this score
    MinScore(u8),
    /// No earlier run invalidated its hypothesis
    HypothesisHeld,
}

impl GateCondition {
    /// Whether the gate opens; with no earlier regions it always does
    pub fn is_met(&self, previous: &[RegionOutcome]) -> bool {
        let ran: Vec<&RegionOutcome> = previous
            .iter()
            .filter(|o| o.status != RegionStatus::Skipped)
            .collect();
        if ran.is_empty() {
            return true;
        }
        match self {
            Self::AllPreviousSucceeded => ran.iter().all(|o| o.status == RegionStatus::Succeeded),
            Self::AnyPreviousSucceeded => ran.iter().any(|o| o.status == RegionStatus::Succeeded),
            Self::MinScore(min) => ran.iter().all(|o| o.score.is_some_and(|s| s >= *min)),
            Self::HypothesisHeld => ran
                .iter()
                .flat_map(|o| o.results.iter())
                .all(|r| r.hypothesis_valid),
        }
    }
}

impl fmt::Display for GateCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllPreviousSucceeded => write!(f, "all previous regions succeeded"),
            Self::AnyPreviousSucceeded => write!(f, "any previous region succeeded"),
            Self::MinScore(min) => write!(f, "previous scores at least {min}"),
            Self::HypothesisHeld => write!(f, "previous hypotheses held"),
        }
    }
}

/// A region to run in, with an optional gate (conditional mode)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionPlan {
    pub name: String,
    #[serde(default)]
    pub condition: Option<GateCondition>,
}

impl RegionPlan {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            condition: None,
        }
    }

    #[must_use]
    pub fn with_condition(mut self, condition: GateCondition) -> Self {
        self.condition = Some(condition);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionStatus {
    Succeeded,
    Skipped,
    Cancelled,
    Failed,
}

/// Everything one region produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionOutcome {
    pub region: String,
    pub status: RegionStatus,
    /// One entry per run (several in pipelined mode)
    pub results: Vec<ExperimentResults>,
    pub error: Option<String>,
    /// Lowest score across this region's runs
    pub score: Option<u8>,
}

impl RegionOutcome {
    fn skipped(region: &str, reason: impl Into<String>) -> Self {
        Self {
            region: region.to_string(),
            status: RegionStatus::Skipped,
            results: Vec::new(),
            error: Some(reason.into()),
            score: None,
        }
    }

    fn from_runs(region: &str, runs: Vec<Result<ExperimentResults, ApplicationError>>) -> Self {
        if runs.is_empty() {
            return Self::skipped(region, "no stage ran");
        }
        let mut status = RegionStatus::Succeeded;
        let mut errors = Vec::new();
        let mut results = Vec::new();
        for run in runs {
            let run_status = match run {
                Ok(r) => {
                    let s = match r.status {
                        ExperimentStatus::Completed => RegionStatus::Succeeded,
                        ExperimentStatus::Aborted => RegionStatus::Cancelled,
                        _ => RegionStatus::Failed,
                    };
                    results.push(r);
                    s
                },
                Err(ApplicationError::Aborted(message)) => {
                    errors.push(message);
                    RegionStatus::Cancelled
                },
                Err(e) => {
                    errors.push(e.to_string());
                    RegionStatus::Failed
                },
            };
            status = status.max(run_status);
        }
        let score = results.iter().map(calculate_resilience_score).min();
        Self {
            region: region.to_string(),
            status,
            results,
            error: (!errors.is_empty()).then(|| errors.join("; ")),
            score,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status == RegionStatus::Failed
    }
}

/// Aggregated outcome of a distributed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributedResults {
    pub experiment_id: ExperimentId,
    pub mode: CoordinationMode,
    pub regions: Vec<RegionOutcome>,
    pub mean_score: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DistributedResults {
    fn count(&self, status: RegionStatus) -> usize {
        self.regions.iter().filter(|r| r.status == status).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(RegionStatus::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(RegionStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(RegionStatus::Skipped)
    }

    pub fn region(&self, name: &str) -> Option<&RegionOutcome> {
        self.regions.iter().find(|r| r.region == name)
    }
}

/// Runs one experiment across regions
pub struct DistributedCoordinator {
    runner: Arc<dyn RegionRunner>,
}

impl fmt::Debug for DistributedCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedCoordinator").finish_non_exhaustive()
    }
}

type WaveResult = Result<ExperimentResults, ApplicationError>;

impl DistributedCoordinator {
    #[must_use]
    pub fn new(runner: Arc<dyn RegionRunner>) -> Self {
        Self { runner }
    }

    /// Run `experiment` in every region of `regions` under `policy`
    ///
    /// Fails only when the plan itself is invalid. A region whose run fails
    /// is recorded as such; other regions continue unless
    /// `stop_on_failure` is set.
    #[instrument(skip(self, experiment, regions, cancel), fields(experiment_id = %experiment.id, mode = %policy.mode, regions = regions.len()))]
    pub async fn run(
        &self,
        experiment: &Experiment,
        regions: &[RegionPlan],
        policy: &CoordinationPolicy,
        cancel: &CancellationToken,
    ) -> Result<DistributedResults, ApplicationError> {
        Self::validate_plan(experiment, regions)?;
        let started_at = Utc::now();

        let outcomes = match policy.mode {
            CoordinationMode::Sequential => {
                self.run_sequential(experiment, regions, policy, cancel, false)
                    .await
            },
            CoordinationMode::Conditional => {
                self.run_sequential(experiment, regions, policy, cancel, true)
                    .await
            },
            CoordinationMode::Parallel => self.run_parallel(experiment, regions, policy, cancel).await,
            CoordinationMode::Pipelined => {
                self.run_pipelined(experiment, regions, policy, cancel)
                    .await
            },
        };

        let scores: Vec<f64> = outcomes
            .iter()
            .filter_map(|o| o.score.map(f64::from))
            .collect();
        #[allow(clippy::cast_precision_loss)]
        let mean_score =
            (!scores.is_empty()).then(|| scores.iter().sum::<f64>() / scores.len() as f64);

        let results = DistributedResults {
            experiment_id: experiment.id.clone(),
            mode: policy.mode,
            regions: outcomes,
            mean_score,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            succeeded = results.succeeded(),
            failed = results.failed(),
            skipped = results.skipped(),
            mean_score = ?results.mean_score,
            "Distributed run finished"
        );
        Ok(results)
    }

    fn validate_plan(experiment: &Experiment, regions: &[RegionPlan]) -> Result<(), ApplicationError> {
        experiment.validate()?;
        if regions.is_empty() {
            return Err(ApplicationError::Validation(
                "at least one region is required".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for plan in regions {
            if plan.name.trim().is_empty() {
                return Err(ApplicationError::Validation(
                    "region name is required".to_string(),
                ));
            }
            if !seen.insert(plan.name.as_str()) {
                return Err(ApplicationError::Validation(format!(
                    "duplicate region '{}'",
                    plan.name
                )));
            }
        }
        Ok(())
    }

    async fn run_sequential(
        &self,
        experiment: &Experiment,
        regions: &[RegionPlan],
        policy: &CoordinationPolicy,
        cancel: &CancellationToken,
        gated: bool,
    ) -> Vec<RegionOutcome> {
        let mut outcomes: Vec<RegionOutcome> = Vec::with_capacity(regions.len());
        let mut stopped_by: Option<String> = None;

        for plan in regions {
            if cancel.is_cancelled() {
                outcomes.push(RegionOutcome {
                    status: RegionStatus::Cancelled,
                    ..RegionOutcome::skipped(&plan.name, "cancelled before start")
                });
                continue;
            }
            if let Some(failed) = &stopped_by {
                outcomes.push(RegionOutcome::skipped(
                    &plan.name,
                    format!("skipped after failure in region '{failed}'"),
                ));
                continue;
            }
            if gated {
                if let Some(condition) = &plan.condition {
                    if !condition.is_met(&outcomes) {
                        info!(region = %plan.name, %condition, "Region gate closed");
                        outcomes.push(RegionOutcome::skipped(
                            &plan.name,
                            format!("condition not met: {condition}"),
                        ));
                        continue;
                    }
                }
            }

            let regional = regional_experiment(experiment, &plan.name, None);
            let run = self
                .runner
                .run_in_region(&plan.name, regional, cancel.clone())
                .await;
            let outcome = RegionOutcome::from_runs(&plan.name, vec![run]);
            if outcome.is_failure() {
                warn!(region = %plan.name, error = ?outcome.error, "Region failed");
                if policy.stop_on_failure {
                    stopped_by = Some(plan.name.clone());
                }
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn run_parallel(
        &self,
        experiment: &Experiment,
        regions: &[RegionPlan],
        policy: &CoordinationPolicy,
        cancel: &CancellationToken,
    ) -> Vec<RegionOutcome> {
        let wave: Vec<(usize, String, Experiment)> = regions
            .iter()
            .enumerate()
            .map(|(i, plan)| (i, plan.name.clone(), regional_experiment(experiment, &plan.name, None)))
            .collect();
        let mut runs = self.run_wave(wave, cancel, policy.stop_on_failure).await;

        regions
            .iter()
            .enumerate()
            .map(|(i, plan)| {
                let run = runs[i].take().map_or_else(Vec::new, |r| vec![r]);
                RegionOutcome::from_runs(&plan.name, run)
            })
            .collect()
    }

    async fn run_pipelined(
        &self,
        experiment: &Experiment,
        regions: &[RegionPlan],
        policy: &CoordinationPolicy,
        cancel: &CancellationToken,
    ) -> Vec<RegionOutcome> {
        let stages: Vec<_> = experiment.enabled_faults().cloned().collect();
        let mut per_region: Vec<Vec<WaveResult>> = regions.iter().map(|_| Vec::new()).collect();

        for (stage, fault) in stages.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            let mut staged = experiment.clone();
            staged.faults = vec![fault.clone()];
            let wave = regions
                .iter()
                .enumerate()
                .map(|(i, plan)| (i, plan.name.clone(), regional_experiment(&staged, &plan.name, Some(stage + 1))))
                .collect();

            info!(stage = stage + 1, fault_id = %fault.id, "Starting pipeline stage");
            let runs = self.run_wave(wave, cancel, false).await;

            let mut stage_failed = false;
            for (i, run) in runs.into_iter().enumerate() {
                if let Some(run) = run {
                    stage_failed |= !matches!(&run, Ok(r) if r.status == ExperimentStatus::Completed);
                    per_region[i].push(run);
                }
            }
            if stage_failed && policy.stop_on_failure {
                warn!(stage = stage + 1, "Pipeline stage failed, stopping");
                break;
            }
        }

        regions
            .iter()
            .zip(per_region)
            .map(|(plan, runs)| RegionOutcome::from_runs(&plan.name, runs))
            .collect()
    }

    /// Run a set of regional experiments concurrently and join them all
    ///
    /// With `fail_fast`, the first failure cancels the remaining runs.
    async fn run_wave(
        &self,
        wave: Vec<(usize, String, Experiment)>,
        cancel: &CancellationToken,
        fail_fast: bool,
    ) -> Vec<Option<WaveResult>> {
        let mut slots: Vec<Option<WaveResult>> = (0..wave.len()).map(|_| None).collect();
        let scope = cancel.child();
        let mut tasks = JoinSet::new();

        for (index, region, regional) in wave {
            let runner = Arc::clone(&self.runner);
            let token = scope.clone();
            tasks.spawn(async move {
                let run = runner.run_in_region(&region, regional, token).await;
                (index, run)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, run)) => {
                    let failed = !matches!(&run, Ok(r) if r.status == ExperimentStatus::Completed);
                    if failed && fail_fast && !scope.is_cancelled() {
                        warn!(index, "Region failed, cancelling the remaining regions");
                        scope.cancel();
                    }
                    slots[index] = Some(run);
                },
                Err(e) => warn!(error = %e, "Region task did not complete"),
            }
        }
        // regional tokens stay in the registry after the wave
        scope.detach();

        // a task that panicked leaves its slot empty
        for slot in &mut slots {
            if slot.is_none() {
                *slot = Some(Err(ApplicationError::Internal(
                    "region task did not complete".to_string(),
                )));
            }
        }
        slots
    }
}

/// Copy of `experiment` scoped to one region (and pipeline stage)
fn regional_experiment(experiment: &Experiment, region: &str, stage: Option<usize>) -> Experiment {
    let mut regional = experiment.clone();
    let id = match stage {
        Some(stage) => format!("{}-{region}-s{stage}", experiment.id),
        None => format!("{}-{region}", experiment.id),
    };
    regional.id = ExperimentId::new(id);
    regional.target.region = Some(region.to_string());
    regional.status = ExperimentStatus::Pending;
    regional.started_at = None;
    regional.completed_at = None;
    regional.results = None;
    regional.tags.push(format!("region:{region}"));
    regional
}
