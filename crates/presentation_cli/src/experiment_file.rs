//! Experiment definition files
//!
//! Experiments are written by hand as JSON or TOML, chosen by file
//! extension. Top-level durations are plain seconds; fault durations use
//! the `{ secs, nanos }` form of the stored record.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use domain::entities::{
    Experiment, ExperimentResults, FaultDefinition, InjectionFailurePolicy, RecoveryConfig, Target,
};
use domain::value_objects::Priority;
use serde::Deserialize;

/// Hand-written experiment definition
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentFile {
    /// Generated when missing
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub hypothesis: String,
    pub target: Target,
    pub duration_secs: u64,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub failure_policy: InjectionFailurePolicy,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub approved_by: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub faults: Vec<FaultDefinition>,
}

impl ExperimentFile {
    pub fn into_experiment(self) -> Experiment {
        let mut experiment = Experiment::new(
            self.name,
            self.target,
            Duration::from_secs(self.duration_secs),
        )
        .with_description(self.description)
        .with_hypothesis(self.hypothesis)
        .with_recovery(self.recovery);

        if let Some(id) = self.id {
            experiment = experiment.with_id(id);
        }
        if let Some(approver) = self.approved_by {
            experiment = experiment.approved_by(approver);
        }
        experiment.timeout = self.timeout_secs.map(Duration::from_secs);
        experiment.priority = self.priority;
        experiment.failure_policy = self.failure_policy;
        experiment.dry_run = self.dry_run;
        experiment.tags = self.tags;
        experiment.faults = self.faults;
        experiment
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> Result<Format> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        _ => bail!(
            "cannot tell the format of {}; use a .json or .toml file",
            path.display()
        ),
    }
}

fn parse<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let format = format_of(path)?;
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    match format {
        Format::Json => serde_json::from_str(&raw)
            .with_context(|| format!("invalid experiment JSON in {}", path.display())),
        Format::Toml => {
            toml::from_str(&raw).with_context(|| format!("invalid TOML in {}", path.display()))
        },
    }
}

/// Load an experiment definition; faults are not validated yet
pub fn load_experiment(path: &Path) -> Result<Experiment> {
    parse::<ExperimentFile>(path).map(ExperimentFile::into_experiment)
}

/// Load finished results, as printed by `run` or stored by the engine
pub fn load_results(path: &Path) -> Result<ExperimentResults> {
    if format_of(path)? != Format::Json {
        bail!("results must be a .json file");
    }
    parse(path)
}
