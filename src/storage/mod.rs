/// Persistence boundary
///
/// The engine talks to storage only through [`WorkflowStore`] and
/// [`ExecutionStore`]. [`SqliteStore`] is the production adapter;
/// [`InMemoryStore`] backs tests and throwaway deployments.

// SQLite pool setup and schema
pub mod database;

// sqlx-backed adapter
pub mod sqlite;

// tokio RwLock-backed adapter
pub mod memory;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::runtime::context::{Execution, NodeLog, RunOutcome, TriggeredBy};
use crate::workflow::Workflow;

/// Workflow definitions and their activation state.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>>;

    async fn list_workflows(&self) -> Result<Vec<Workflow>>;

    /// Insert or replace a definition. Run statistics already recorded are kept.
    async fn save_workflow(&self, workflow: &Workflow) -> Result<()>;

    async fn delete_workflow(&self, id: &str) -> Result<bool>;

    /// Flip `is_active`; returns false when the workflow does not exist.
    async fn set_active(&self, id: &str, active: bool) -> Result<bool>;

    /// Stamp `last_run_at` and bump `run_count`.
    async fn record_run(&self, id: &str, at: DateTime<Utc>) -> Result<()>;
}

/// Persisted runs and their node trail.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Persist a new run in `running` state.
    async fn create_running(&self, workflow_id: &str, triggered_by: TriggeredBy) -> Result<Execution>;

    async fn append_node_log(&self, execution_id: &str, log: &NodeLog) -> Result<()>;

    /// Move a `running` run to its terminal state, computing the duration.
    /// Returns false if the run was already finalized.
    async fn finalize(&self, execution_id: &str, outcome: &RunOutcome) -> Result<bool>;

    async fn get_execution(&self, id: &str) -> Result<Option<Execution>>;

    /// Most recent first.
    async fn list_executions(&self, workflow_id: &str, limit: usize) -> Result<Vec<Execution>>;
}

/// Both halves of the persistence boundary.
pub trait Store: WorkflowStore + ExecutionStore {}

impl<T: WorkflowStore + ExecutionStore> Store for T {}
