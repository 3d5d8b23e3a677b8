/// HTTP API Layer
///
/// This module provides the REST API endpoints for workflow management,
/// run control and scheduler control. It handles:
/// - Workflow CRUD operations (with schedule hot-reload)
/// - Starting, stopping and inspecting runs
/// - Execution history
/// - Scheduler start/stop/refresh

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::sync::Arc;

use crate::error::EngineError;
use crate::runtime::{engine::ExecutionEngine, scheduler::SchedulerService};
use crate::storage::Store;

// Workflow management and run control endpoints
pub mod workflows;

// Execution history endpoints
pub mod executions;

// Scheduler control endpoints
pub mod scheduler;

// Re-export router builders
pub use executions::create_execution_routes;
pub use scheduler::create_scheduler_routes;
pub use workflows::create_workflow_routes;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    /// Workflow and execution persistence
    pub store: Arc<dyn Store>,
    /// Run orchestration
    pub engine: Arc<ExecutionEngine>,
    /// Recurring triggers
    pub scheduler: Arc<SchedulerService>,
}

/// JSON error body `{ "error": "..." }` with a status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("{} not found", what))
    }

    /// Log the cause and hide it behind a 500.
    pub fn internal(context: &str, error: impl std::fmt::Display) -> Self {
        tracing::error!("❌ {}: {}", context, error);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, context.to_string())
    }
}

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        let status = match &error {
            EngineError::WorkflowNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::AlreadyRunning { .. } | EngineError::UserBusy { .. } => StatusCode::CONFLICT,
            EngineError::Expired { .. } => StatusCode::GONE,
            EngineError::NotActive { .. } | EngineError::Configuration { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::Cancelled => StatusCode::CONFLICT,
            EngineError::NodeFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            EngineError::Storage(e) => return Self::internal("storage failure", e),
        };
        Self::new(status, error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
