/// Run-exclusivity tracking
///
/// Holds one [`RunningWorkflow`] per in-flight run, indexed by workflow id and
/// by owning user. The check for both conflicts and the registration happen
/// under one lock, so two racing starts can never both succeed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

/// An in-flight run.
#[derive(Debug, Clone, Serialize)]
pub struct RunningWorkflow {
    /// Identifies this claim; stale releases for an older claim are ignored
    pub run_id: String,
    pub workflow_id: String,
    /// Empty until the execution row has been created
    pub execution_id: String,
    pub user_id: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip)]
    pub cancel: CancellationToken,
}

/// Registry of in-flight runs; injectable so tests get isolated instances.
#[async_trait]
pub trait RunTracker: Send + Sync {
    /// Claim the workflow (and its user, if any) or report who holds it.
    async fn try_begin(&self, workflow_id: &str, user_id: Option<&str>) -> EngineResult<RunningWorkflow>;

    /// Record the execution id on the claim `run_id`.
    async fn attach_execution(&self, workflow_id: &str, run_id: &str, execution_id: &str);

    /// Release the claim `run_id`; a no-op if the workflow is now held by another claim.
    async fn end(&self, workflow_id: &str, run_id: &str);

    async fn get(&self, workflow_id: &str) -> Option<RunningWorkflow>;

    async fn list(&self) -> Vec<RunningWorkflow>;
}

#[derive(Debug, Default)]
struct TrackerState {
    by_workflow: HashMap<String, RunningWorkflow>,
    /// user id -> workflow id
    by_user: HashMap<String, String>,
}

/// Single-process tracker backed by tokio `RwLock` maps.
#[derive(Debug, Default)]
pub struct InMemoryRunTracker {
    state: RwLock<TrackerState>,
}

impl InMemoryRunTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunTracker for InMemoryRunTracker {
    async fn try_begin(&self, workflow_id: &str, user_id: Option<&str>) -> EngineResult<RunningWorkflow> {
        let mut state = self.state.write().await;

        if let Some(existing) = state.by_workflow.get(workflow_id) {
            return Err(EngineError::AlreadyRunning {
                workflow_id: workflow_id.to_string(),
                execution_id: existing.execution_id.clone(),
            });
        }

        if let Some(user) = user_id {
            if let Some(busy_workflow) = state.by_user.get(user) {
                let execution_id = state
                    .by_workflow
                    .get(busy_workflow)
                    .map(|run| run.execution_id.clone())
                    .unwrap_or_default();
                return Err(EngineError::UserBusy {
                    user_id: user.to_string(),
                    workflow_id: busy_workflow.clone(),
                    execution_id,
                });
            }
        }

        let run = RunningWorkflow {
            run_id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.to_string(),
            execution_id: String::new(),
            user_id: user_id.map(str::to_string),
            started_at: Utc::now(),
            cancel: CancellationToken::new(),
        };

        state.by_workflow.insert(workflow_id.to_string(), run.clone());
        if let Some(user) = user_id {
            state.by_user.insert(user.to_string(), workflow_id.to_string());
        }

        Ok(run)
    }

    async fn attach_execution(&self, workflow_id: &str, run_id: &str, execution_id: &str) {
        if let Some(run) = self.state.write().await.by_workflow.get_mut(workflow_id) {
            if run.run_id == run_id {
                run.execution_id = execution_id.to_string();
            }
        }
    }

    async fn end(&self, workflow_id: &str, run_id: &str) {
        let mut state = self.state.write().await;

        let held = state.by_workflow.get(workflow_id).map_or(false, |run| run.run_id == run_id);
        if !held {
            return;
        }

        if let Some(run) = state.by_workflow.remove(workflow_id) {
            if let Some(user) = run.user_id {
                if state.by_user.get(&user).map(String::as_str) == Some(workflow_id) {
                    state.by_user.remove(&user);
                }
            }
        }
    }

    async fn get(&self, workflow_id: &str) -> Option<RunningWorkflow> {
        self.state.read().await.by_workflow.get(workflow_id).cloned()
    }

    async fn list(&self) -> Vec<RunningWorkflow> {
        let mut runs: Vec<_> = self.state.read().await.by_workflow.values().cloned().collect();
        runs.sort_by_key(|run| run.started_at);
        runs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_workflow_is_rejected_until_released() {
        let tracker = InMemoryRunTracker::new();
        let run = tracker.try_begin("wf-1", None).await.unwrap();
        tracker.attach_execution("wf-1", &run.run_id, "exec-1").await;

        match tracker.try_begin("wf-1", None).await {
            Err(EngineError::AlreadyRunning { execution_id, .. }) => assert_eq!(execution_id, "exec-1"),
            other => panic!("expected conflict, got {:?}", other),
        }

        tracker.end("wf-1", &run.run_id).await;
        assert!(tracker.try_begin("wf-1", None).await.is_ok());
    }

    #[tokio::test]
    async fn same_user_is_rejected_across_workflows() {
        let tracker = InMemoryRunTracker::new();
        let first = tracker.try_begin("wf-1", Some("alice")).await.unwrap();

        match tracker.try_begin("wf-2", Some("alice")).await {
            Err(EngineError::UserBusy { workflow_id, .. }) => assert_eq!(workflow_id, "wf-1"),
            other => panic!("expected user conflict, got {:?}", other),
        }
        assert!(tracker.try_begin("wf-3", Some("bob")).await.is_ok());

        tracker.end("wf-1", &first.run_id).await;
        assert!(tracker.try_begin("wf-2", Some("alice")).await.is_ok());
    }

    #[tokio::test]
    async fn stale_claims_do_not_touch_a_newer_run() {
        let tracker = InMemoryRunTracker::new();
        let old = tracker.try_begin("wf-1", None).await.unwrap();
        tracker.end("wf-1", &old.run_id).await;

        let new = tracker.try_begin("wf-1", None).await.unwrap();
        tracker.attach_execution("wf-1", &new.run_id, "new").await;

        tracker.attach_execution("wf-1", &old.run_id, "old").await;
        tracker.end("wf-1", &old.run_id).await;

        assert_eq!(tracker.get("wf-1").await.map(|r| r.execution_id), Some("new".to_string()));
        assert_eq!(tracker.list().await.len(), 1);
    }
}
