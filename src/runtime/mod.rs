/// Runtime execution layer
///
/// Everything that happens once a workflow is asked to run:
/// - Topological ordering of nodes (petgraph)
/// - Node handlers over the typed node specs
/// - Run-exclusivity tracking and cooperative cancellation
/// - The execution orchestrator and the recurring-trigger scheduler

// Execution records and the in-flight context
pub mod context;

// Kahn ordering over a petgraph DiGraph
pub mod sorter;

// Whitespace, truncation, dedup and date sort for job lists
pub mod normalize;

// Per-node-kind handlers
pub mod executor;

// Per-workflow and per-user run claims
pub mod tracker;

// Run lifecycle orchestration
pub mod engine;

// tokio-cron-scheduler backed recurring triggers
pub mod scheduler;

// Re-export main types
pub use context::{Execution, ExecutionContext, ExecutionStatus, NodeLog, NodeStatus, TriggeredBy};
pub use engine::{ExecutionEngine, StopOutcome};
pub use executor::{ExecutorSettings, NodeError, NodeExecutor};
pub use scheduler::{SchedulerService, SchedulerStatus};
pub use tracker::{InMemoryRunTracker, RunTracker, RunningWorkflow};
