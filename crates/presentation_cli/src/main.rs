//! Chaos engine CLI
//!
//! Validates, runs and inspects chaos experiments. Runs go through the full
//! engine against a simulated fault backend.

#![allow(clippy::print_stdout)]

mod commands;
mod experiment_file;

use std::path::PathBuf;

use application::CoordinationMode;
use application::ports::ExperimentQuery;
use clap::{Parser, Subcommand, ValueEnum};
use domain::value_objects::ExperimentStatus;
use infrastructure::{AppConfig, init_tracing};

use crate::commands::RunOptions;

/// Chaos engine CLI
#[derive(Debug, Parser)]
#[command(name = "chaos-cli")]
#[command(author, version, about = "Chaos experiment orchestration", long_about = None)]
struct Cli {
    /// Verbosity level; overrides the configured log filter
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file (default: chaos.toml if present)
    #[arg(short, long, env = "CHAOS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check an experiment file against its own rules and the safety policy
    Validate {
        /// Experiment definition (.json or .toml)
        file: PathBuf,
    },

    /// Run an experiment, in one or several regions
    ///
    /// Example: chaos-cli run checkout.toml --region eu-west --region us-east --mode sequential
    Run {
        /// Experiment definition (.json or .toml)
        file: PathBuf,

        /// Log injections instead of performing them
        #[arg(long)]
        dry_run: bool,

        /// Region to run in; repeat for several
        #[arg(short, long = "region")]
        regions: Vec<String>,

        /// Run in every configured region
        #[arg(long, conflicts_with = "regions")]
        all_regions: bool,

        /// How regional runs relate in time
        #[arg(long, value_enum, default_value_t = Mode::Sequential)]
        mode: Mode,

        /// Stop launching regional runs after the first failure
        #[arg(long)]
        stop_on_failure: bool,

        /// Store the experiment and its results in the database
        #[arg(long)]
        persist: bool,
    },

    /// Compute the resilience score of a results file
    Score {
        /// Results as JSON
        file: PathBuf,
    },

    /// Classify the potential impact of an experiment
    BlastRadius {
        /// Experiment definition (.json or .toml)
        file: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List stored experiments, newest first
    List {
        #[arg(long)]
        status: Option<ExperimentStatus>,

        #[arg(long)]
        tag: Option<String>,

        #[arg(short = 'n', long, default_value = "20")]
        limit: u32,
    },

    /// Show one stored experiment as JSON
    Show {
        /// Experiment id
        id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Sequential,
    Parallel,
    Pipelined,
    Conditional,
}

impl From<Mode> for CoordinationMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Sequential => Self::Sequential,
            Mode::Parallel => Self::Parallel,
            Mode::Pipelined => Self::Pipelined,
            Mode::Conditional => Self::Conditional,
        }
    }
}

/// Determine log filter level from verbosity count
const fn log_filter_from_verbosity(verbose: u8) -> Option<&'static str> {
    match verbose {
        0 => None,
        1 => Some("info"),
        2 => Some("debug"),
        _ => Some("trace"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from(cli.config.as_deref())?;
    if let Some(filter) = log_filter_from_verbosity(cli.verbose) {
        config.telemetry.log_filter = filter.to_string();
    }
    init_tracing(&config.telemetry)?;

    match cli.command {
        Commands::Validate { file } => commands::validate(&config, &file)?,

        Commands::Run {
            file,
            dry_run,
            regions,
            all_regions,
            mode,
            stop_on_failure,
            persist,
        } => {
            let options = RunOptions {
                dry_run,
                regions,
                all_regions,
                mode: mode.into(),
                stop_on_failure,
                persist,
            };
            commands::run(&config, &file, &options).await?;
        },

        Commands::Score { file } => commands::score(&file)?,

        Commands::BlastRadius { file, json } => commands::blast_radius(&file, json)?,

        Commands::List { status, tag, limit } => {
            let query = ExperimentQuery {
                status,
                tag,
                limit: Some(limit),
            };
            commands::list(&config, &query).await?;
        },

        Commands::Show { id } => commands::show(&config, &id).await?,
    }

    Ok(())
}
