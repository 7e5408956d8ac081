//! CLI argument definitions, grounded on the teacher's
//! `presentation::cli::commands::Cli` shape (a `Parser` struct with
//! `value_enum` output formats and a count-based verbosity flag).

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary.
    Text,
    /// Full `ExecutionOutput` as JSON.
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "conductor")]
#[command(author, version, about = "Run YAML-defined agent ensembles")]
#[command(long_about = r#"
Conductor runs a YAML-defined ensemble: a sequence of agent steps, each
optionally gated by an evaluator's score, threading a shared execution
context and cross-step state from one step to the next.

Example:
  conductor run onboard-customer.yaml --input input.json
  conductor validate onboard-customer.yaml
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to a TOML config file (merged over defaults and any
    /// discovered `conductor.toml`).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run an ensemble from its YAML definition.
    Run {
        /// Path to the ensemble YAML file.
        ensemble: PathBuf,

        /// Path to a JSON file supplying the trigger input; defaults to `{}`.
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output format.
        #[arg(short, long, value_enum, default_value = "text")]
        output: OutputFormat,
    },

    /// Parse and validate an ensemble YAML file without running it.
    Validate {
        /// Path to the ensemble YAML file.
        ensemble: PathBuf,
    },

    /// Resume a suspended run from a host-persisted snapshot.
    Resume {
        /// Path to the ensemble YAML file the snapshot belongs to.
        ensemble: PathBuf,

        /// Path to the JSON snapshot file (a `SuspendedState`).
        snapshot: PathBuf,

        /// Path to a JSON file supplying the resume input; defaults to `{}`.
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output format.
        #[arg(short, long, value_enum, default_value = "text")]
        output: OutputFormat,
    },
}
