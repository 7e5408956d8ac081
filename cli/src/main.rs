//! CLI entrypoint for Conductor.
//!
//! Wires the infrastructure adapters (YAML parser, built-in+user agent
//! resolver, webhook/email notifier) into the application use case, the
//! same manual dependency-injection shape as the teacher's `cli/src/main.rs`.

mod cli;
mod present;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command, OutputFormat};
use conductor_application::{AgentResolverPort, ExecuteEnsembleUseCase};
use conductor_infrastructure::{ConfigLoader, FileConfig, NotificationManager, Resolver, YamlEnsembleParser};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let host_config = ConfigLoader::load(cli.config.as_ref())
        .map_err(|e| anyhow::anyhow!(e.to_string()))
        .context("loading host configuration")?;

    // `-v`/`-vv`/`-vvv` overrides the config file's level; with no flag at
    // all, the host config's `logging.level` drives the filter.
    let filter = match cli.verbose {
        0 => EnvFilter::new(host_config.logging.level.clone()),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(level = %host_config.logging.level, "starting conductor");

    match cli.command {
        Command::Run { ensemble, input, output } => {
            let yaml = std::fs::read_to_string(&ensemble)
                .with_context(|| format!("reading {}", ensemble.display()))?;
            let input = read_json_or_empty(input.as_deref())?;

            let parser = YamlEnsembleParser::new();
            let resolver = Arc::new(Resolver::empty());
            let notifier = Arc::new(notification_manager_from_config(&host_config));
            let use_case = ExecuteEnsembleUseCase::new(resolver, notifier);
            let cancellation = CancellationToken::new();

            let result = use_case
                .execute_from_yaml(
                    &parser,
                    &yaml,
                    input,
                    serde_json::Value::Object(Default::default()),
                    serde_json::Value::Null,
                    &cancellation,
                )
                .await;

            print_result(result, output)
        }
        Command::Validate { ensemble } => {
            let yaml = std::fs::read_to_string(&ensemble)
                .with_context(|| format!("reading {}", ensemble.display()))?;
            let parser = YamlEnsembleParser::new();
            let resolver = Resolver::empty();

            match parser.parse(&yaml).and_then(|doc| {
                parser
                    .validate_agent_references(&doc, &resolver.available_names())
                    .map(|_| doc)
            }) {
                Ok(doc) => {
                    println!("ok: '{}' ({} flow step(s))", doc.name, doc.flow.len());
                    Ok(())
                }
                Err(err) => {
                    eprintln!("{}", present::error_to_json(&err));
                    std::process::exit(1);
                }
            }
        }
        Command::Resume { ensemble, snapshot, input, output } => {
            let yaml = std::fs::read_to_string(&ensemble)
                .with_context(|| format!("reading {}", ensemble.display()))?;
            let snapshot_json: serde_json::Value = serde_json::from_str(
                &std::fs::read_to_string(&snapshot)
                    .with_context(|| format!("reading {}", snapshot.display()))?,
            )
            .context("parsing snapshot JSON")?;
            let suspended = present::suspended_state_from_json(&snapshot_json)
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
            let resume_input = read_json_or_empty(input.as_deref())?;

            let parser = YamlEnsembleParser::new();
            let doc = parser.parse(&yaml).map_err(|e| anyhow::anyhow!(e.to_string()))?;

            let resolver = Arc::new(Resolver::empty());
            let notifier = Arc::new(notification_manager_from_config(&host_config));
            let use_case = ExecuteEnsembleUseCase::new(resolver, notifier);
            let cancellation = CancellationToken::new();

            let result = use_case
                .resume_execution(
                    &doc,
                    suspended,
                    resume_input,
                    serde_json::Value::Object(Default::default()),
                    serde_json::Value::Null,
                    &cancellation,
                )
                .await;

            print_result(result, output)
        }
    }
}

fn notification_manager_from_config(config: &FileConfig) -> NotificationManager {
    NotificationManager::new(
        Duration::from_secs(config.http.timeout_seconds),
        config.notifications.default_retries,
        config.notifications.retry_schedule_seconds.clone(),
    )
}

fn read_json_or_empty(path: Option<&std::path::Path>) -> Result<serde_json::Value> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).context("parsing input JSON")
        }
        None => Ok(serde_json::Value::Object(Default::default())),
    }
}

fn print_result(
    result: Result<conductor_application::ExecutionOutput, conductor_domain::ConductorError>,
    format: OutputFormat,
) -> Result<()> {
    match result {
        Ok(output) => {
            match format {
                OutputFormat::Json => {
                    println!("{}", present::execution_output_to_json(&output));
                }
                OutputFormat::Text => {
                    println!("ensemble: {}", output.metrics.ensemble);
                    println!("duration: {}ms", output.metrics.total_duration_ms);
                    for step in &output.metrics.agents {
                        println!(
                            "  - {} ({}ms){}",
                            step.name,
                            step.duration_ms,
                            if step.cached { " [cached]" } else { "" }
                        );
                    }
                    println!("output: {}", output.output);
                }
            }
            Ok(())
        }
        Err(err) => {
            eprintln!("{}", present::error_to_json(&err));
            std::process::exit(1);
        }
    }
}
