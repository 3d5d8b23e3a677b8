/// Engine-level error types
///
/// One variant per failure class the execution orchestrator can surface.
/// Run-start rejections (conflicts, expiry, inactive) are returned before any
/// execution row is written; node failures are also persisted on the run.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Message recorded on runs that were stopped explicitly.
pub const STOPPED_BY_USER: &str = "stopped by user";

/// Errors produced by the execution orchestrator and its collaborators.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No workflow with this id exists in storage.
    #[error("workflow '{0}' not found")]
    WorkflowNotFound(String),

    /// A node is missing a required field (e.g. a source without `sourceId`).
    #[error("node '{node_id}' is misconfigured: {message}")]
    Configuration { node_id: String, message: String },

    /// The workflow already has a run in progress.
    #[error("workflow '{workflow_id}' is already running (execution {execution_id})")]
    AlreadyRunning {
        workflow_id: String,
        execution_id: String,
    },

    /// The owning user already has a run in progress on another workflow.
    #[error("user '{user_id}' already has workflow '{workflow_id}' running (execution {execution_id})")]
    UserBusy {
        user_id: String,
        workflow_id: String,
        execution_id: String,
    },

    /// The activation window elapsed; the workflow has been deactivated.
    #[error("workflow '{workflow_id}' expired at {deactivates_at} and has been deactivated")]
    Expired {
        workflow_id: String,
        deactivates_at: DateTime<Utc>,
    },

    /// The workflow is not published or not active.
    #[error("workflow '{workflow_id}' is not runnable: {reason}")]
    NotActive { workflow_id: String, reason: String },

    /// The run was stopped between two nodes.
    #[error("{}", STOPPED_BY_USER)]
    Cancelled,

    /// A handler failed; the run stops at this node.
    #[error("node '{node_id}' ({node_type}) failed: {message}")]
    NodeFailed {
        node_id: String,
        node_type: String,
        message: String,
    },

    /// Persistence failure from a store adapter.
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    /// True for the two run-exclusivity rejections.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::AlreadyRunning { .. } | Self::UserBusy { .. })
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
