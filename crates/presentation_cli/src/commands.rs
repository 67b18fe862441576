//! Subcommand implementations

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use application::ports::{ExperimentQuery, ExperimentStorePort};
use application::{
    AdmissionDecision, ChaosOrchestrator, CoordinationMode, CoordinationPolicy, RegionPlan,
    SafetyPolicyEngine, calculate_resilience_score, generate_blast_radius,
};
use domain::entities::{Experiment, PolicyViolation};
use domain::value_objects::{ExperimentId, ExperimentStatus};
use infrastructure::{AppConfig, FaultBackend, SimulatedBackend, build_orchestrator, open_store};
use tracing::{info, warn};

use crate::experiment_file::{load_experiment, load_results};

/// Options of the `run` subcommand
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    /// Explicit region names; overrides `all_regions`
    pub regions: Vec<String>,
    /// Use every region from the configuration
    pub all_regions: bool,
    pub mode: CoordinationMode,
    pub stop_on_failure: bool,
    pub persist: bool,
}

impl RunOptions {
    fn region_plans(&self, config: &AppConfig) -> Vec<RegionPlan> {
        if !self.regions.is_empty() {
            return self
                .regions
                .iter()
                .map(|name| {
                    config
                        .regions
                        .iter()
                        .find(|plan| &plan.name == name)
                        .cloned()
                        .unwrap_or_else(|| RegionPlan::new(name.clone()))
                })
                .collect();
        }
        if self.all_regions {
            return config.regions.clone();
        }
        Vec::new()
    }
}

fn print_violation(violation: &PolicyViolation) {
    println!(
        "   [{}] {} ({:?}): {}",
        violation.severity, violation.rule, violation.action, violation.message
    );
}

/// Check structure and the configured safety policy
pub fn validate(config: &AppConfig, file: &Path) -> Result<()> {
    let experiment = load_experiment(file)?;
    experiment
        .validate()
        .with_context(|| format!("experiment '{}' is invalid", experiment.name))?;

    let engine = SafetyPolicyEngine::new(config.policy.clone());
    match engine.admission(&experiment) {
        AdmissionDecision::Admit { warnings } => {
            println!("✅ {} passes policy '{}'", experiment.name, config.policy.name);
            for warning in &warnings {
                print_violation(warning);
            }
            Ok(())
        },
        AdmissionDecision::Deny { violations } => {
            println!("⛔ {} is denied by policy '{}'", experiment.name, config.policy.name);
            violations.iter().for_each(print_violation);
            bail!("{} policy violation(s)", violations.len())
        },
        AdmissionDecision::RequireApproval { violations } => {
            println!("✋ {} needs approval", experiment.name);
            violations.iter().for_each(print_violation);
            bail!("experiment requires approval; set approved_by")
        },
    }
}

/// Stop the experiment on Ctrl-C; faults are removed before the run returns
fn stop_on_interrupt(orchestrator: &Arc<ChaosOrchestrator>, id: &ExperimentId) {
    let orchestrator = Arc::clone(orchestrator);
    let id = id.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(experiment_id = %id, "interrupted, stopping experiment");
            if let Err(e) = orchestrator.stop_experiment(&id) {
                warn!(error = %e, "failed to stop experiment");
            }
        }
    });
}

/// Run an experiment against the simulated backend
pub async fn run(config: &AppConfig, file: &Path, options: &RunOptions) -> Result<()> {
    let mut experiment = load_experiment(file)?;
    experiment.dry_run |= options.dry_run;

    let store: Option<Arc<dyn ExperimentStorePort>> = if options.persist {
        Some(Arc::new(open_store(config)?))
    } else {
        None
    };
    let backend: Arc<dyn FaultBackend> = Arc::new(SimulatedBackend::new());
    let orchestrator = Arc::new(build_orchestrator(config, backend, store)?);

    let id = orchestrator.create_experiment(experiment).await?;
    stop_on_interrupt(&orchestrator, &id);

    let plans = options.region_plans(config);
    if plans.is_empty() {
        let results = orchestrator.run_experiment(&id).await?;
        let report = orchestrator.report(&id).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        info!(experiment_id = %id, score = report.score, status = %results.status, "run finished");

        if results.status != ExperimentStatus::Completed {
            bail!("experiment finished as {}", results.status);
        }
        return Ok(());
    }

    let policy = CoordinationPolicy {
        mode: options.mode,
        stop_on_failure: options.stop_on_failure,
    };
    let results = orchestrator.run_distributed(&id, &plans, &policy).await?;
    println!("{}", serde_json::to_string_pretty(&results)?);

    if results.failed() > 0 {
        bail!(
            "{} of {} region(s) failed",
            results.failed(),
            results.regions.len()
        );
    }
    Ok(())
}

/// Score a results file
pub fn score(file: &Path) -> Result<()> {
    let results = load_results(file)?;
    let score = calculate_resilience_score(&results);

    println!("📊 Resilience score: {score}/100");
    println!("   status:     {}", results.status);
    println!("   failures:   {}", results.failures.len());
    println!("   hypothesis: {}", if results.hypothesis_valid { "held" } else { "invalidated" });
    if results.recovery.attempted {
        println!(
            "   recovery:   {} after {} poll(s)",
            if results.recovery.successful { "succeeded" } else { "failed" },
            results.recovery.attempts
        );
    }
    Ok(())
}

/// Classify the potential impact of an experiment file
pub fn blast_radius(file: &Path, json: bool) -> Result<()> {
    let experiment = load_experiment(file)?;
    let radius = generate_blast_radius(&experiment);

    if json {
        println!("{}", serde_json::to_string_pretty(&radius)?);
        return Ok(());
    }
    println!("💥 Blast radius of {}", experiment.name);
    println!("   scope:    {}", radius.scope);
    println!("   severity: {}", radius.severity);
    println!("   target:   {}", radius.impact.target_name);
    println!("   fault:    {}", radius.impact.fault_type);
    println!("   duration: {}s", radius.impact.duration.as_secs());
    if let Some(namespace) = &radius.impact.namespace {
        println!("   namespace: {namespace}");
    }
    Ok(())
}

/// List persisted experiments, newest first
pub async fn list(config: &AppConfig, query: &ExperimentQuery) -> Result<()> {
    let store = open_store(config)?;
    let experiments = store.list(query).await?;

    if experiments.is_empty() {
        println!("No experiments found");
        return Ok(());
    }
    for experiment in &experiments {
        println!("{}", summary_line(experiment));
    }
    Ok(())
}

fn summary_line(experiment: &Experiment) -> String {
    let score = experiment
        .results
        .as_ref()
        .map_or_else(|| "-".to_string(), |r| calculate_resilience_score(r).to_string());
    format!(
        "{:<40} {:<10} {:<6} score={:<3} {} ({})",
        experiment.id,
        experiment.status,
        experiment.priority,
        score,
        experiment.name,
        experiment.created_at.format("%Y-%m-%d %H:%M:%S")
    )
}

/// Print one persisted experiment as JSON
pub async fn show(config: &AppConfig, id: &str) -> Result<()> {
    let store = open_store(config)?;
    let Some(experiment) = store.get(&ExperimentId::new(id)).await? else {
        bail!("experiment '{id}' not found");
    };
    println!("{}", serde_json::to_string_pretty(&experiment)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use domain::entities::Target;

    use super::*;

    fn config_with_regions() -> AppConfig {
        AppConfig {
            regions: vec![
                RegionPlan::new("eu-west"),
                RegionPlan::new("us-east")
                    .with_condition(application::GateCondition::AllPreviousSucceeded),
            ],
            ..AppConfig::default()
        }
    }

    #[test]
    fn no_regions_means_single_run() {
        assert!(RunOptions::default().region_plans(&config_with_regions()).is_empty());
    }

    #[test]
    fn all_regions_come_from_config() {
        let options = RunOptions {
            all_regions: true,
            ..RunOptions::default()
        };
        assert_eq!(options.region_plans(&config_with_regions()).len(), 2);
    }

    #[test]
    fn named_regions_keep_configured_gates() {
        let options = RunOptions {
            regions: vec!["us-east".into(), "ap-south".into()],
            all_regions: true,
            ..RunOptions::default()
        };
        let plans = options.region_plans(&config_with_regions());

        assert_eq!(plans.len(), 2);
        assert!(plans[0].condition.is_some());
        assert_eq!(plans[1], RegionPlan::new("ap-south"));
    }

    #[test]
    fn summary_line_without_results_has_no_score() {
        let experiment = Experiment::new("drill", Target::new("service", "api"), Duration::from_secs(60))
            .with_id("exp-1");
        let line = summary_line(&experiment);
        assert!(line.starts_with("exp-1"));
        assert!(line.contains("score=-"));
        assert!(line.contains("pending"));
    }
}
