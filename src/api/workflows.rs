/// Workflow management REST API endpoints
///
/// CRUD over workflow definitions plus run control. Saving validates the
/// definition and hot-reloads its schedule; deleting unschedules it first.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::{ApiError, ApiResult, AppState};
use crate::runtime::{
    context::{Execution, TriggeredBy},
    engine::StopOutcome,
    tracker::RunningWorkflow,
};
use crate::storage::{ExecutionStore, WorkflowStore};
use crate::workflow::types::Workflow;

/// Default page size for execution history
const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Response for workflow creation/update operations
#[derive(Debug, Serialize)]
pub struct WorkflowResponse {
    pub id: String,
    pub message: String,
    /// Whether the workflow now has an armed recurring trigger
    pub scheduled: bool,
}

/// Request body for workflow creation
#[derive(Debug, Deserialize)]
pub struct CreateWorkflowRequest {
    pub workflow: Workflow,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub triggered_by: Option<TriggeredBy>,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub execution_id: String,
    pub workflow_id: String,
    pub triggered_by: TriggeredBy,
}

#[derive(Debug, Serialize)]
pub struct RunStatusResponse {
    pub workflow_id: String,
    pub is_running: bool,
    pub run: Option<RunningWorkflow>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// Create workflow management routes
pub fn create_workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/api/workflows", post(create_workflow).get(list_workflows))
        .route(
            "/api/workflows/{id}",
            get(get_workflow).put(update_workflow).delete(delete_workflow),
        )
        .route("/api/workflows/{id}/execute", post(execute_workflow))
        .route("/api/workflows/{id}/stop", post(stop_workflow))
        .route("/api/workflows/{id}/status", get(workflow_status))
        .route("/api/workflows/{id}/executions", get(list_workflow_executions))
        .route("/api/running", get(list_running))
}

/// Create a new workflow
///
/// POST /api/workflows
/// Body: { "workflow": { "id": "...", "name": "...", "nodes": [...], "edges": [...] } }
async fn create_workflow(
    State(state): State<AppState>,
    Json(payload): Json<CreateWorkflowRequest>,
) -> ApiResult<(StatusCode, Json<WorkflowResponse>)> {
    let workflow = payload.workflow;
    validate(&workflow)?;

    match state.store.get_workflow(&workflow.id).await {
        Ok(Some(_)) => {
            return Err(ApiError::new(
                StatusCode::CONFLICT,
                format!("workflow '{}' already exists", workflow.id),
            ))
        }
        Ok(None) => {}
        Err(e) => return Err(ApiError::internal("failed to look up workflow", e)),
    }

    let scheduled = persist(&state, &workflow).await?;
    tracing::info!("🔥 Created workflow: {} ({})", workflow.id, workflow.name);

    Ok((
        StatusCode::CREATED,
        Json(WorkflowResponse {
            id: workflow.id.clone(),
            message: format!("Workflow '{}' created successfully", workflow.name),
            scheduled,
        }),
    ))
}

/// List all workflows
///
/// GET /api/workflows
async fn list_workflows(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let workflows = state
        .store
        .list_workflows()
        .await
        .map_err(|e| ApiError::internal("failed to list workflows", e))?;
    Ok(Json(json!({ "workflows": workflows })))
}

/// GET /api/workflows/{id}
async fn get_workflow(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Workflow>> {
    state
        .store
        .get_workflow(&id)
        .await
        .map_err(|e| ApiError::internal("failed to load workflow", e))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("workflow '{}'", id)))
}

/// Replace an existing workflow definition
///
/// PUT /api/workflows/{id}
async fn update_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<CreateWorkflowRequest>,
) -> ApiResult<Json<WorkflowResponse>> {
    let mut workflow = payload.workflow;
    workflow.id = id.clone();
    validate(&workflow)?;

    let exists = state
        .store
        .get_workflow(&id)
        .await
        .map_err(|e| ApiError::internal("failed to look up workflow", e))?
        .is_some();
    if !exists {
        return Err(ApiError::not_found(format!("workflow '{}'", id)));
    }

    let scheduled = persist(&state, &workflow).await?;
    tracing::info!("🔥 Hot-reloaded workflow: {} ({})", workflow.id, workflow.name);

    Ok(Json(WorkflowResponse {
        id: workflow.id.clone(),
        message: format!("Workflow '{}' updated successfully", workflow.name),
        scheduled,
    }))
}

/// DELETE /api/workflows/{id}
async fn delete_workflow(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    state.scheduler.unschedule_workflow(&id).await;

    match state.store.delete_workflow(&id).await {
        Ok(true) => {
            tracing::info!("🗑️ Deleted workflow: {}", id);
            Ok(Json(json!({ "message": "Workflow deleted successfully" })))
        }
        Ok(false) => Err(ApiError::not_found(format!("workflow '{}'", id))),
        Err(e) => Err(ApiError::internal("failed to delete workflow", e)),
    }
}

/// Start a run in the background
///
/// POST /api/workflows/{id}/execute
/// Body (optional): { "triggered_by": "manual" | "api" }
async fn execute_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Option<Json<ExecuteRequest>>,
) -> ApiResult<(StatusCode, Json<ExecuteResponse>)> {
    let request = payload.map(|Json(body)| body).unwrap_or_default();
    let triggered_by = request.triggered_by.unwrap_or_default();
    if triggered_by == TriggeredBy::Schedule {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "schedule triggers are reserved for the scheduler",
        ));
    }

    let execution = state.engine.spawn_execution(&id, triggered_by).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ExecuteResponse {
            execution_id: execution.id,
            workflow_id: id,
            triggered_by,
        }),
    ))
}

/// POST /api/workflows/{id}/stop
async fn stop_workflow(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<StopOutcome>> {
    Ok(Json(state.engine.stop(&id).await?))
}

/// GET /api/workflows/{id}/status
async fn workflow_status(State(state): State<AppState>, Path(id): Path<String>) -> Json<RunStatusResponse> {
    let run = state.engine.status(&id).await;
    Json(RunStatusResponse {
        workflow_id: id,
        is_running: run.is_some(),
        run,
    })
}

/// GET /api/workflows/{id}/executions?limit=N
async fn list_workflow_executions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<Execution>>> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    state
        .store
        .list_executions(&id, limit)
        .await
        .map(Json)
        .map_err(|e| ApiError::internal("failed to list executions", e))
}

/// GET /api/running
async fn list_running(State(state): State<AppState>) -> Json<Vec<RunningWorkflow>> {
    Json(state.engine.running().await)
}

fn validate(workflow: &Workflow) -> ApiResult<()> {
    if workflow.name.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "workflow name is required"));
    }
    workflow
        .validate()
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))
}

/// Save the definition and hot-reload its schedule.
async fn persist(state: &AppState, workflow: &Workflow) -> ApiResult<bool> {
    state
        .store
        .save_workflow(workflow)
        .await
        .map_err(|e| ApiError::internal("failed to save workflow", e))?;

    state
        .scheduler
        .schedule_workflow(workflow)
        .await
        .map_err(|e| ApiError::internal("failed to schedule workflow", e))
}
