/// Scheduler control endpoints
///
/// GET  /api/scheduler/status
/// POST /api/scheduler/start | stop | refresh | sweep

use axum::{extract::State, response::Json, routing::{get, post}, Router};
use serde_json::{json, Value};

use crate::api::{ApiError, ApiResult, AppState};
use crate::runtime::scheduler::SchedulerStatus;

pub fn create_scheduler_routes() -> Router<AppState> {
    Router::new()
        .route("/api/scheduler/status", get(status))
        .route("/api/scheduler/start", post(start))
        .route("/api/scheduler/stop", post(stop))
        .route("/api/scheduler/refresh", post(refresh))
        .route("/api/scheduler/sweep", post(sweep))
}

async fn status(State(state): State<AppState>) -> Json<SchedulerStatus> {
    Json(state.scheduler.status().await)
}

async fn start(State(state): State<AppState>) -> ApiResult<Json<SchedulerStatus>> {
    state
        .scheduler
        .start()
        .await
        .map_err(|e| ApiError::internal("failed to start scheduler", e))?;
    Ok(Json(state.scheduler.status().await))
}

async fn stop(State(state): State<AppState>) -> ApiResult<Json<SchedulerStatus>> {
    state
        .scheduler
        .stop()
        .await
        .map_err(|e| ApiError::internal("failed to stop scheduler", e))?;
    Ok(Json(state.scheduler.status().await))
}

async fn refresh(State(state): State<AppState>) -> ApiResult<Json<SchedulerStatus>> {
    state
        .scheduler
        .refresh()
        .await
        .map_err(|e| ApiError::internal("failed to refresh scheduler", e))?;
    Ok(Json(state.scheduler.status().await))
}

async fn sweep(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let deactivated = state
        .scheduler
        .sweep_expired()
        .await
        .map_err(|e| ApiError::internal("expiry sweep failed", e))?;
    Ok(Json(json!({ "deactivated": deactivated })))
}
