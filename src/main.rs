use std::collections::HashMap;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use formwork_engine::{ExecutionMode, GraphRunner, RunRequest};
use formwork_graph::WorkflowVersion;
use formwork_sandbox::ExprSandbox;
use formwork_store::{MemoryRowRepository, RowValues};

/// Formwork - workflow execution engine for the formwork builder
#[derive(Parser)]
#[command(name = "formwork")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Execute a published workflow version
  Run {
    /// Path to the workflow version file (JSON)
    workflow_file: PathBuf,

    /// Execution mode: "live" commits writes, "preview" shadows them
    #[arg(long, default_value = "preview")]
    mode: String,

    /// Path to a JSON file of seed tables ({ "table_id": [ { ...values } ] })
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Path to a JSON alias map file (alias -> canonical id)
    #[arg(long)]
    aliases: Option<PathBuf>,

    /// Tenant identifier recorded on the run
    #[arg(long, default_value = "local")]
    tenant: String,

    /// Include the full per-node trace in the report
    #[arg(long)]
    debug: bool,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  match cli.command {
    Some(Commands::Run {
      workflow_file,
      mode,
      seed,
      aliases,
      tenant,
      debug,
    }) => {
      run_workflow(workflow_file, mode, seed, aliases, tenant, debug)?;
    }
    None => {
      println!("formwork - use --help to see available commands");
    }
  }

  Ok(())
}

fn run_workflow(
  workflow_file: PathBuf,
  mode: String,
  seed: Option<PathBuf>,
  aliases: Option<PathBuf>,
  tenant: String,
  debug: bool,
) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run_workflow_async(workflow_file, mode, seed, aliases, tenant, debug).await })
}

async fn run_workflow_async(
  workflow_file: PathBuf,
  mode: String,
  seed: Option<PathBuf>,
  aliases: Option<PathBuf>,
  tenant: String,
  debug: bool,
) -> Result<()> {
  let mode = match mode.as_str() {
    "live" => ExecutionMode::Live,
    "preview" => ExecutionMode::Preview,
    other => bail!("unknown mode '{}', expected 'live' or 'preview'", other),
  };

  let workflow_content = tokio::fs::read_to_string(&workflow_file)
    .await
    .with_context(|| format!("failed to read workflow file: {}", workflow_file.display()))?;

  let workflow_version: WorkflowVersion = serde_json::from_str(&workflow_content)
    .with_context(|| format!("failed to parse workflow file: {}", workflow_file.display()))?;

  eprintln!(
    "Loaded workflow: {} v{}",
    workflow_version.name, workflow_version.version
  );

  let input = read_input_from_stdin()?;
  eprintln!("Input: {}", input);

  let repo = Arc::new(MemoryRowRepository::new());
  if let Some(seed_file) = seed {
    let seed_content = tokio::fs::read_to_string(&seed_file)
      .await
      .with_context(|| format!("failed to read seed file: {}", seed_file.display()))?;
    let tables: HashMap<String, Vec<RowValues>> = serde_json::from_str(&seed_content)
      .with_context(|| format!("failed to parse seed file: {}", seed_file.display()))?;
    for (table_id, rows) in tables {
      eprintln!("Seeded table '{}' with {} rows", table_id, rows.len());
      repo.seed_table(&table_id, rows);
    }
  }

  let alias_map = match aliases {
    Some(alias_file) => {
      let alias_content = tokio::fs::read_to_string(&alias_file)
        .await
        .with_context(|| format!("failed to read alias file: {}", alias_file.display()))?;
      Some(
        serde_json::from_str(&alias_content)
          .with_context(|| format!("failed to parse alias file: {}", alias_file.display()))?,
      )
    }
    None => None,
  };

  let runner = GraphRunner::new(repo, Arc::new(ExprSandbox));
  let cancel = CancellationToken::new();

  let report = runner
    .run(
      RunRequest {
        workflow_version,
        input,
        tenant_id: tenant,
        mode,
        alias_map,
        debug,
      },
      cancel,
    )
    .await
    .context("run failed")?;

  eprintln!("Run completed: {:?}", report.status);

  println!("{}", serde_json::to_string_pretty(&report)?);

  Ok(())
}

fn read_input_from_stdin() -> Result<serde_json::Value> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    // No stdin pipe, use empty object
    Ok(serde_json::json!({}))
  } else {
    let mut input = String::new();
    io::stdin()
      .read_to_string(&mut input)
      .context("failed to read input from stdin")?;

    if input.trim().is_empty() {
      Ok(serde_json::json!({}))
    } else {
      serde_json::from_str(&input).context("failed to parse input JSON from stdin")
    }
  }
}
