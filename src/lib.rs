/// jobflow: scheduled job-posting collection pipelines
///
/// A workflow is a DAG of typed nodes (trigger, job-source, normalize-data,
/// filter, daily-email) executed in topological order against a shared job
/// list, started manually, over the API, or by a recurring schedule.

// Core configuration and setup
pub mod config;

// Engine-level error taxonomy
pub mod error;

// Workflow definitions, typed node specs and filter criteria
pub mod workflow;

// External job boards behind a common scraper trait
pub mod scraper;

// Digest delivery
pub mod notify;

// Workflow and execution persistence
pub mod storage;

// Runtime execution engine - petgraph ordering, node handlers, run tracking, scheduling
pub mod runtime;

// HTTP API layer - REST endpoints for workflows, runs and the scheduler
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use error::{EngineError, EngineResult};
pub use runtime::{Execution, ExecutionEngine, ExecutionStatus, TriggeredBy};
pub use server::start_server;
pub use workflow::{Edge, Node, NodeSpec, Workflow};
