//! Workflow graph execution engine.
//!
//! Executes the node/edge graph of a published workflow version in one of
//! two modes: `live` runs commit side effects to the row repository as nodes
//! execute; `preview` runs hold every write in an in-memory shadow overlay
//! that later query nodes in the same run observe, so the durable store is
//! never touched while downstream behavior stays identical.
//!
//! # Architecture
//!
//! ```text
//! GraphRunner
//! └── run(request, cancel) - validates the graph, walks edges breadth-first
//!     from the start node, gates traversal on edge conditions, and collects
//!     the trace, outputs and metrics
//!
//! Executors - one handler per node kind (input, output, query, write,
//!     validate, script, conditional), dispatched over the closed enum
//!
//! ExecutionContext - per-run state: resolved variables, query/script cache,
//!     idempotency ledger, shadow writes, metrics. Created at the top of
//!     `run`, dropped when it returns; nothing is shared across runs.
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use formwork_engine::{ExecutionMode, GraphRunner, RunRequest};
//!
//! let runner = GraphRunner::new(repo, sandbox);
//! let report = runner
//!     .run(RunRequest {
//!         workflow_version,
//!         input: serde_json::json!({ "amount": 250 }),
//!         tenant_id: "acme".to_string(),
//!         mode: ExecutionMode::Preview,
//!         alias_map: None,
//!         debug: true,
//!     }, cancel)
//!     .await?;
//! ```

mod cache;
mod context;
mod error;
mod executor;
mod runner;
mod shadow;
mod trace;

pub use cache::RunCache;
pub use context::{ExecutionContext, ExecutionMode, RunMetrics};
pub use error::{EngineError, NodeError};
pub use executor::NodeOutcome;
pub use runner::{GraphRunner, RunReport, RunRequest, RunnerConfig};
pub use shadow::ShadowStore;
pub use trace::{NodeStatus, RunStatus, SideEffect, TraceEntry};
