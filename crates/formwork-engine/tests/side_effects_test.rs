//! Side-effect properties of the engine: preview isolation, shadow
//! visibility, live commits, write idempotency and per-run caching.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use formwork_engine::{ExecutionMode, GraphRunner, NodeStatus, RunRequest, RunStatus};
use formwork_graph::{Edge, FilterSpec, Node, NodeConfig, WorkflowVersion, WriteOperation};
use formwork_sandbox::{ExprSandbox, ScriptOutcome, ScriptRequest, ScriptSandbox};
use formwork_store::{FilterOp, MemoryRowRepository, RowValues};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

fn data(pairs: &[(&str, &str)]) -> HashMap<String, String> {
  pairs
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn create_node(node_id: &str, table_id: &str, columns: &[(&str, &str)], output_key: &str) -> Node {
  Node {
    node_id: node_id.to_string(),
    config: NodeConfig::Write {
      table_id: table_id.to_string(),
      operation: WriteOperation::Create,
      row_id: None,
      data: data(columns),
      output_key: output_key.to_string(),
    },
  }
}

fn query_node(
  node_id: &str,
  table_id: &str,
  filters: &[(&str, &str)],
  limit: Option<usize>,
  output_key: &str,
) -> Node {
  Node {
    node_id: node_id.to_string(),
    config: NodeConfig::Query {
      table_id: table_id.to_string(),
      filters: filters
        .iter()
        .map(|(column, value)| FilterSpec {
          column: column.to_string(),
          op: FilterOp::Eq,
          value: value.to_string(),
        })
        .collect(),
      limit,
      output_key: output_key.to_string(),
    },
  }
}

fn conditional_node(node_id: &str) -> Node {
  Node {
    node_id: node_id.to_string(),
    config: NodeConfig::Conditional {
      expression: None,
      output_key: None,
    },
  }
}

fn edge(from: &str, to: &str) -> Edge {
  Edge {
    from: from.to_string(),
    to: to.to_string(),
    condition: None,
  }
}

fn workflow(nodes: Vec<Node>, edges: Vec<Edge>, start: &str) -> WorkflowVersion {
  WorkflowVersion {
    workflow_id: "wf-effects".to_string(),
    version: 1,
    name: "Effects".to_string(),
    nodes,
    edges,
    start_node_id: start.to_string(),
  }
}

async fn run(
  repo: Arc<MemoryRowRepository>,
  workflow: WorkflowVersion,
  mode: ExecutionMode,
) -> formwork_engine::RunReport {
  let runner = GraphRunner::new(repo, Arc::new(ExprSandbox));
  runner
    .run(
      RunRequest {
        workflow_version: workflow,
        input: json!({}),
        tenant_id: "test".to_string(),
        mode,
        alias_map: None,
        debug: true,
      },
      CancellationToken::new(),
    )
    .await
    .expect("run failed")
}

fn entries<'a>(
  report: &'a formwork_engine::RunReport,
  node_id: &str,
) -> Vec<&'a formwork_engine::TraceEntry> {
  report
    .trace
    .as_ref()
    .expect("expected debug trace")
    .iter()
    .filter(|entry| entry.node_id == node_id)
    .collect()
}

fn single<'a>(
  report: &'a formwork_engine::RunReport,
  node_id: &str,
) -> &'a formwork_engine::TraceEntry {
  let found = entries(report, node_id);
  assert_eq!(found.len(), 1, "expected one trace entry for {node_id}");
  found[0]
}

fn values(pairs: &[(&str, Value)]) -> RowValues {
  pairs
    .iter()
    .map(|(k, v)| (k.to_string(), v.clone()))
    .collect()
}

/// A preview write followed by a query in the same run: the query observes
/// the shadow row while the repository sees no calls at all.
#[tokio::test]
async fn test_preview_write_then_query_sees_shadow_row() {
  let repo = Arc::new(MemoryRowRepository::new());
  let wf = workflow(
    vec![
      create_node("write1", "t1", &[("name", "'Test'")], "created"),
      query_node("query1", "t1", &[("name", "'Test'")], None, "query_result"),
    ],
    vec![edge("write1", "query1")],
    "write1",
  );

  let report = run(repo.clone(), wf, ExecutionMode::Preview).await;

  assert_eq!(report.status, RunStatus::Success);
  assert_eq!(repo.create_calls(), 0);
  assert_eq!(repo.write_calls(), 0);
  assert_eq!(repo.read_calls(), 0);

  let write = single(&report, "write1");
  assert_eq!(write.status, NodeStatus::Executed);
  let effects = write.side_effects.as_ref().expect("side effects");
  assert!(!effects[0].committed);

  let query = single(&report, "query1");
  let rows = query.outputs_delta.as_ref().unwrap()["query_result"]
    .as_array()
    .expect("array result");
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0]["name"], json!("Test"));
}

#[tokio::test]
async fn test_live_write_commits_exactly_once() {
  let repo = Arc::new(MemoryRowRepository::new());
  let wf = workflow(
    vec![
      create_node("write1", "t1", &[("name", "'Test'")], "created"),
      query_node("query1", "t1", &[("name", "'Test'")], None, "query_result"),
    ],
    vec![edge("write1", "query1")],
    "write1",
  );

  let report = run(repo.clone(), wf, ExecutionMode::Live).await;

  assert_eq!(report.status, RunStatus::Success);
  assert_eq!(repo.create_calls(), 1);
  assert_eq!(repo.read_calls(), 1);

  let stored = repo.rows("t1");
  assert_eq!(stored.len(), 1);
  assert_eq!(stored[0].values["name"], json!("Test"));

  let query = single(&report, "query1");
  let rows = query.outputs_delta.as_ref().unwrap()["query_result"]
    .as_array()
    .unwrap();
  assert_eq!(rows.len(), 1);
  assert!(single(&report, "write1").side_effects.as_ref().unwrap()[0].committed);
}

/// The same write node reached through two converging edge paths applies its
/// side effect exactly once; the second visit is skipped by the ledger.
#[tokio::test]
async fn test_converging_edges_apply_write_once() {
  let repo = Arc::new(MemoryRowRepository::new());
  let wf = workflow(
    vec![
      conditional_node("fork"),
      conditional_node("left"),
      conditional_node("right"),
      create_node("write1", "t1", &[("name", "'Test'")], "created"),
    ],
    vec![
      edge("fork", "left"),
      edge("fork", "right"),
      edge("left", "write1"),
      edge("right", "write1"),
    ],
    "fork",
  );

  let report = run(repo.clone(), wf, ExecutionMode::Live).await;

  assert_eq!(repo.create_calls(), 1);

  let visits = entries(&report, "write1");
  assert_eq!(visits.len(), 2);
  assert_eq!(visits[0].status, NodeStatus::Executed);
  assert_eq!(visits[1].status, NodeStatus::Skipped);
  assert!(
    visits[1]
      .skip_reason
      .as_deref()
      .unwrap()
      .contains("idempotency")
  );
}

/// Identical (table, filters, limit) within one run hits the cache; a
/// different filter value reaches the repository again. A second run starts
/// cold - cache state never crosses run boundaries.
#[tokio::test]
async fn test_query_cache_is_per_run() {
  let repo = Arc::new(MemoryRowRepository::new());
  repo.seed_table("t1", vec![values(&[("name", json!("a"))])]);

  let wf = workflow(
    vec![
      query_node("q1", "t1", &[("name", "'a'")], None, "first"),
      query_node("q2", "t1", &[("name", "'a'")], None, "second"),
      query_node("q3", "t1", &[("name", "'b'")], None, "third"),
    ],
    vec![edge("q1", "q2"), edge("q2", "q3")],
    "q1",
  );

  let report = run(repo.clone(), wf.clone(), ExecutionMode::Live).await;

  assert_eq!(repo.read_calls(), 2);
  assert!(single(&report, "q1").skip_reason.is_none());
  assert_eq!(single(&report, "q2").skip_reason.as_deref(), Some("cached"));
  assert!(single(&report, "q3").skip_reason.is_none());

  // Cached entries still carry the result downstream.
  let cached = single(&report, "q2").outputs_delta.as_ref().unwrap();
  assert_eq!(cached["second"].as_array().unwrap().len(), 1);

  run(repo.clone(), wf, ExecutionMode::Live).await;
  assert_eq!(repo.read_calls(), 4);
}

/// Preview updates and deletes stay in the overlay: later queries in the run
/// observe them, the store never changes.
#[tokio::test]
async fn test_preview_update_and_delete_stay_isolated() {
  let repo = Arc::new(MemoryRowRepository::new());
  repo.seed_table("t1", vec![values(&[("name", json!("Orig"))])]);

  let update_node = Node {
    node_id: "update1".to_string(),
    config: NodeConfig::Write {
      table_id: "t1".to_string(),
      operation: WriteOperation::Update,
      row_id: Some("rows[0].row_id".to_string()),
      data: data(&[("name", "'New'")]),
      output_key: "updated".to_string(),
    },
  };
  let delete_node = Node {
    node_id: "delete1".to_string(),
    config: NodeConfig::Write {
      table_id: "t1".to_string(),
      operation: WriteOperation::Delete,
      row_id: Some("rows[0].row_id".to_string()),
      data: HashMap::new(),
      output_key: "deleted".to_string(),
    },
  };

  let wf = workflow(
    vec![
      query_node("q1", "t1", &[], None, "rows"),
      update_node,
      query_node("q2", "t1", &[], Some(10), "after_update"),
      delete_node,
      query_node("q3", "t1", &[], Some(5), "after_delete"),
    ],
    vec![
      edge("q1", "update1"),
      edge("update1", "q2"),
      edge("q2", "delete1"),
      edge("delete1", "q3"),
    ],
    "q1",
  );

  let report = run(repo.clone(), wf, ExecutionMode::Preview).await;

  assert_eq!(report.status, RunStatus::Success);
  assert_eq!(repo.write_calls(), 0);

  let after_update = single(&report, "q2").outputs_delta.as_ref().unwrap();
  let rows = after_update["after_update"].as_array().unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0]["name"], json!("New"));

  let after_delete = single(&report, "q3").outputs_delta.as_ref().unwrap();
  assert!(after_delete["after_delete"].as_array().unwrap().is_empty());

  // The durable store is untouched.
  let stored = repo.rows("t1");
  assert_eq!(stored.len(), 1);
  assert_eq!(stored[0].values["name"], json!("Orig"));
}

#[tokio::test]
async fn test_live_update_applies_to_store() {
  let repo = Arc::new(MemoryRowRepository::new());
  repo.seed_table("t1", vec![values(&[("name", json!("Orig"))])]);

  let update_node = Node {
    node_id: "update1".to_string(),
    config: NodeConfig::Write {
      table_id: "t1".to_string(),
      operation: WriteOperation::Update,
      row_id: Some("rows[0].row_id".to_string()),
      data: data(&[("name", "'New'")]),
      output_key: "updated".to_string(),
    },
  };

  let wf = workflow(
    vec![query_node("q1", "t1", &[], None, "rows"), update_node],
    vec![edge("q1", "update1")],
    "q1",
  );

  run(repo.clone(), wf, ExecutionMode::Live).await;

  assert_eq!(repo.update_calls(), 1);
  assert_eq!(repo.rows("t1")[0].values["name"], json!("New"));
}

struct CountingSandbox {
  calls: AtomicUsize,
}

#[async_trait]
impl ScriptSandbox for CountingSandbox {
  async fn execute(&self, _request: ScriptRequest) -> ScriptOutcome {
    self.calls.fetch_add(1, Ordering::SeqCst);
    ScriptOutcome::success(json!("done"))
  }
}

/// A script node revisited through converging edges replays from the script
/// cache instead of re-entering the sandbox.
#[tokio::test]
async fn test_script_cache_dedupes_repeat_visits() {
  let repo = Arc::new(MemoryRowRepository::new());
  let sandbox = Arc::new(CountingSandbox {
    calls: AtomicUsize::new(0),
  });

  let script = Node {
    node_id: "s1".to_string(),
    config: NodeConfig::Script {
      code: "transform()".to_string(),
      input_keys: vec![],
      output_key: "result".to_string(),
      timeout_ms: None,
    },
  };

  let wf = workflow(
    vec![
      conditional_node("fork"),
      conditional_node("left"),
      conditional_node("right"),
      script,
    ],
    vec![
      edge("fork", "left"),
      edge("fork", "right"),
      edge("left", "s1"),
      edge("right", "s1"),
    ],
    "fork",
  );

  let runner = GraphRunner::new(repo, sandbox.clone());
  let report = runner
    .run(
      RunRequest {
        workflow_version: wf,
        input: json!({}),
        tenant_id: "test".to_string(),
        mode: ExecutionMode::Preview,
        alias_map: None,
        debug: true,
      },
      CancellationToken::new(),
    )
    .await
    .unwrap();

  assert_eq!(sandbox.calls.load(Ordering::SeqCst), 1);
  let visits = entries(&report, "s1");
  assert_eq!(visits.len(), 2);
  assert_eq!(visits[1].skip_reason.as_deref(), Some("cached"));
}
