//! Graph traversal and the public run entry point.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use formwork_expr::Evaluator;
use formwork_graph::{NodeKind, WorkflowVersion};
use formwork_sandbox::ScriptSandbox;
use formwork_store::RowRepository;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::context::{ExecutionContext, ExecutionMode, RunMetrics};
use crate::error::EngineError;
use crate::executor::Executors;
use crate::trace::{NodeStatus, RunStatus, TraceEntry};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
  /// Script budget applied when a script node has no timeout of its own.
  pub default_script_timeout_ms: u64,
}

impl Default for RunnerConfig {
  fn default() -> Self {
    Self {
      default_script_timeout_ms: 1_000,
    }
  }
}

/// A request to execute one run of a published workflow version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
  pub workflow_version: WorkflowVersion,
  #[serde(default)]
  pub input: Value,
  pub tenant_id: String,
  pub mode: ExecutionMode,
  /// Alias -> canonical id map for this version's fields. Optional; alias
  /// lookups miss silently without it.
  #[serde(default)]
  pub alias_map: Option<HashMap<String, String>>,
  /// When set, the report includes the full per-node trace.
  #[serde(default)]
  pub debug: bool,
}

/// Final report of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
  pub run_id: String,
  pub status: RunStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub trace: Option<Vec<TraceEntry>>,
  pub outputs: Map<String, Value>,
  pub metrics: RunMetrics,
}

/// Executes published workflow graphs.
pub struct GraphRunner {
  executors: Executors,
}

/// A pending visit: a node plus the edge it was reached through.
struct Visit {
  node_id: String,
  via: Option<usize>,
}

impl GraphRunner {
  pub fn new(repo: Arc<dyn RowRepository>, sandbox: Arc<dyn ScriptSandbox>) -> Self {
    Self::with_config(repo, sandbox, RunnerConfig::default())
  }

  pub fn with_config(
    repo: Arc<dyn RowRepository>,
    sandbox: Arc<dyn ScriptSandbox>,
    config: RunnerConfig,
  ) -> Self {
    Self {
      executors: Executors {
        repo,
        sandbox,
        evaluator: Evaluator::new(),
        default_script_timeout_ms: config.default_script_timeout_ms,
      },
    }
  }

  /// Run a workflow version to completion.
  ///
  /// Walks edges breadth-first from the start node. Each edge is followed at
  /// most once per run, so a node reachable through converging edges is
  /// visited once per satisfied edge - the query cache and the idempotency
  /// ledger make the repeat visits harmless.
  ///
  /// # Errors
  /// Fatal graph errors and cancellation abort the run; per-node failures
  /// are recorded in the trace and halt only their own branch.
  #[instrument(
    name = "run_graph",
    skip(self, request, cancel),
    fields(
      workflow_id = %request.workflow_version.workflow_id,
      tenant_id = %request.tenant_id,
      mode = ?request.mode,
    )
  )]
  pub async fn run(
    &self,
    request: RunRequest,
    cancel: CancellationToken,
  ) -> Result<RunReport, EngineError> {
    let run_id = uuid::Uuid::new_v4().to_string();

    info!(
      run_id = %run_id,
      workflow_id = %request.workflow_version.workflow_id,
      mode = ?request.mode,
      "run_started"
    );

    request.workflow_version.validate()?;

    let graph = request.workflow_version.graph();
    let mut ctx = ExecutionContext::new(request.mode, request.input, request.alias_map);
    let mut trace: Vec<TraceEntry> = Vec::new();
    let mut outputs = Map::new();
    let mut any_failure = false;

    let mut queue = VecDeque::new();
    queue.push_back(Visit {
      node_id: request.workflow_version.start_node_id.clone(),
      via: None,
    });
    let mut followed_edges: HashSet<usize> = HashSet::new();

    while let Some(visit) = queue.pop_front() {
      if cancel.is_cancelled() {
        warn!(run_id = %run_id, "run cancelled");
        return Err(EngineError::Cancelled);
      }

      // Validation guarantees every edge target exists.
      let Some(node) = graph.node(&visit.node_id) else {
        continue;
      };

      let mut condition = None;
      let mut condition_result = None;
      if let Some(edge_index) = visit.via {
        let edge = graph.edge(edge_index);
        if let Some(expression) = &edge.condition {
          condition = Some(expression.clone());
          match self.executors.evaluator.eval_truthy(expression, &ctx.scope()) {
            Ok(satisfied) => {
              condition_result = Some(satisfied);
              if !satisfied {
                let mut entry = TraceEntry::new(&node.node_id, node.kind(), NodeStatus::Skipped);
                entry.condition = condition;
                entry.condition_result = condition_result;
                trace.push(entry);
                continue;
              }
            }
            Err(e) => {
              any_failure = true;
              error!(run_id = %run_id, node_id = %node.node_id, error = %e, "node_failed");
              let mut entry = TraceEntry::new(&node.node_id, node.kind(), NodeStatus::Failed);
              entry.condition = condition;
              entry.error = Some(e.to_string());
              trace.push(entry);
              continue;
            }
          }
        }
      }

      match self.executors.execute(node, &mut ctx).await {
        Ok(outcome) => {
          info!(
            run_id = %run_id,
            node_id = %node.node_id,
            status = ?outcome.status,
            "node_executed"
          );

          if node.kind() == NodeKind::Output {
            for (key, value) in &outcome.outputs_delta {
              outputs.insert(key.clone(), value.clone());
            }
          } else {
            ctx.merge_outputs(&outcome.outputs_delta);
          }

          let mut entry = TraceEntry::new(&node.node_id, node.kind(), outcome.status);
          entry.condition = condition;
          entry.condition_result = condition_result;
          if !outcome.outputs_delta.is_empty() {
            entry.outputs_delta = Some(outcome.outputs_delta.into_iter().collect());
          }
          if !outcome.side_effects.is_empty() {
            entry.side_effects = Some(outcome.side_effects);
          }
          entry.skip_reason = outcome.skip_reason;
          trace.push(entry);

          for &edge_index in graph.outgoing(&node.node_id) {
            if followed_edges.insert(edge_index) {
              queue.push_back(Visit {
                node_id: graph.edge(edge_index).to.clone(),
                via: Some(edge_index),
              });
            }
          }
        }
        Err(e) => {
          // Recorded, and traversal halts down this branch only.
          any_failure = true;
          error!(run_id = %run_id, node_id = %node.node_id, error = %e, "node_failed");
          let mut entry = TraceEntry::new(&node.node_id, node.kind(), NodeStatus::Failed);
          entry.condition = condition;
          entry.condition_result = condition_result;
          entry.error = Some(e.to_string());
          trace.push(entry);
        }
      }
    }

    let status = run_status(&request.workflow_version, &trace, any_failure);

    info!(run_id = %run_id, status = ?status, "run_completed");

    Ok(RunReport {
      run_id,
      status,
      trace: request.debug.then_some(trace),
      outputs,
      metrics: ctx.metrics,
    })
  }
}

/// A run succeeds when nothing failed, or when every output node still
/// executed despite branch failures. A graph without output nodes fails on
/// any node failure.
fn run_status(workflow: &WorkflowVersion, trace: &[TraceEntry], any_failure: bool) -> RunStatus {
  if !any_failure {
    return RunStatus::Success;
  }

  let output_nodes: Vec<&str> = workflow
    .nodes
    .iter()
    .filter(|node| node.kind() == NodeKind::Output)
    .map(|node| node.node_id.as_str())
    .collect();

  if output_nodes.is_empty() {
    return RunStatus::Failed;
  }

  let executed: HashSet<&str> = trace
    .iter()
    .filter(|entry| entry.status == NodeStatus::Executed)
    .map(|entry| entry.node_id.as_str())
    .collect();

  if output_nodes.iter().all(|id| executed.contains(id)) {
    RunStatus::Success
  } else {
    RunStatus::Failed
  }
}
