/// Execution history endpoint

use axum::{
    extract::{Path, State},
    response::Json,
    routing::get,
    Router,
};

use crate::api::{ApiError, ApiResult, AppState};
use crate::runtime::context::Execution;
use crate::storage::ExecutionStore;

pub fn create_execution_routes() -> Router<AppState> {
    Router::new().route("/api/executions/{id}", get(get_execution))
}

/// GET /api/executions/{id}
/// Returns the execution with its node logs in execution order
async fn get_execution(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Execution>> {
    state
        .store
        .get_execution(&id)
        .await
        .map_err(|e| ApiError::internal("failed to load execution", e))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("execution '{}'", id)))
}
