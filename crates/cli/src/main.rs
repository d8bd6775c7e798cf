//! `rusty-flow` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate`: load a workflow JSON file, build it and check it.
//! - `run`:      load, build and execute a workflow, then print its outputs.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use engine::{RunState, Workflow, WorkflowDefinition};
use nodes::NodeRegistry;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rusty-flow", about = "Embeddable workflow execution engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Execute a workflow definition and print the resulting outputs.
    Run {
        /// Path to the workflow JSON file.
        path: PathBuf,
        /// Skip the validation pass before running.
        #[arg(long)]
        no_validate: bool,
    },
}

fn load(path: &Path) -> anyhow::Result<Workflow> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    let definition = WorkflowDefinition::from_json(&content).context("invalid workflow JSON")?;
    let workflow = definition
        .build(&NodeRegistry::with_builtins())
        .context("cannot build workflow")?;
    Ok(workflow)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { path } => {
            let workflow = load(&path)?;
            match workflow.validate() {
                Ok(()) => {
                    println!("Workflow is valid:");
                    print!("{}", workflow.outline());
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    eprintln!("Validation failed: {e}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Run { path, no_validate } => {
            let mut workflow = load(&path)?;
            if !no_validate {
                workflow.validate().context("validation failed")?;
            }

            info!(workflow = workflow.name(), "running workflow");
            let state = workflow.start().await;

            println!("state: {state}");
            if let Some(failure) = workflow.failure() {
                println!("failed at '{}': {}", failure.node, failure.error);
            }
            for absorbed in workflow.absorbed_failures() {
                println!("absorbed failure at '{}': {}", absorbed.node, absorbed.error);
            }
            println!("{}", serde_json::to_string_pretty(&workflow.outputs().to_json())?);

            Ok(if state == RunState::Completed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
