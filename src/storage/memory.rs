/// In-memory adapter
///
/// Same semantics as the SQLite adapter, held in tokio `RwLock` maps.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::runtime::context::{Execution, NodeLog, RunOutcome, TriggeredBy};
use crate::storage::{ExecutionStore, WorkflowStore};
use crate::workflow::Workflow;

#[derive(Debug, Default)]
pub struct InMemoryStore {
    workflows: RwLock<HashMap<String, Workflow>>,
    executions: RwLock<HashMap<String, Execution>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryStore {
    async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>> {
        Ok(self.workflows.read().await.get(id).cloned())
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>> {
        let mut workflows: Vec<_> = self.workflows.read().await.values().cloned().collect();
        workflows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(workflows)
    }

    async fn save_workflow(&self, workflow: &Workflow) -> Result<()> {
        let mut workflows = self.workflows.write().await;
        let mut stored = workflow.clone();
        if let Some(existing) = workflows.get(&workflow.id) {
            stored.last_run_at = existing.last_run_at;
            stored.run_count = existing.run_count;
        }
        workflows.insert(stored.id.clone(), stored);
        Ok(())
    }

    async fn delete_workflow(&self, id: &str) -> Result<bool> {
        Ok(self.workflows.write().await.remove(id).is_some())
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<bool> {
        match self.workflows.write().await.get_mut(id) {
            Some(workflow) => {
                workflow.is_active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_run(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        if let Some(workflow) = self.workflows.write().await.get_mut(id) {
            workflow.last_run_at = Some(at);
            workflow.run_count += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionStore for InMemoryStore {
    async fn create_running(&self, workflow_id: &str, triggered_by: TriggeredBy) -> Result<Execution> {
        let execution = Execution::running(workflow_id, triggered_by);
        self.executions
            .write()
            .await
            .insert(execution.id.clone(), execution.clone());
        Ok(execution)
    }

    async fn append_node_log(&self, execution_id: &str, log: &NodeLog) -> Result<()> {
        match self.executions.write().await.get_mut(execution_id) {
            Some(execution) => {
                execution.node_logs.push(log.clone());
                Ok(())
            }
            None => anyhow::bail!("execution '{}' not found", execution_id),
        }
    }

    async fn finalize(&self, execution_id: &str, outcome: &RunOutcome) -> Result<bool> {
        Ok(self
            .executions
            .write()
            .await
            .get_mut(execution_id)
            .map_or(false, |execution| execution.finish(outcome)))
    }

    async fn get_execution(&self, id: &str) -> Result<Option<Execution>> {
        Ok(self.executions.read().await.get(id).cloned())
    }

    async fn list_executions(&self, workflow_id: &str, limit: usize) -> Result<Vec<Execution>> {
        let mut executions: Vec<_> = self
            .executions
            .read()
            .await
            .values()
            .filter(|e| e.workflow_id == workflow_id)
            .cloned()
            .collect();
        executions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        executions.truncate(limit);
        Ok(executions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::context::ExecutionStatus;

    #[tokio::test]
    async fn finalize_is_compare_and_set() {
        let store = InMemoryStore::new();
        let execution = store.create_running("wf-1", TriggeredBy::Schedule).await.unwrap();

        assert!(store.finalize(&execution.id, &RunOutcome::completed(2, 0)).await.unwrap());
        assert!(!store.finalize(&execution.id, &RunOutcome::failed("late", 0, 0)).await.unwrap());
        assert!(!store.finalize("missing", &RunOutcome::completed(0, 0)).await.unwrap());

        let loaded = store.get_execution(&execution.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Completed);
        assert_eq!(loaded.jobs_scraped, 2);
    }

    #[tokio::test]
    async fn node_logs_need_an_execution() {
        let store = InMemoryStore::new();
        let log = NodeLog::start("t", "trigger", 0);
        assert!(store.append_node_log("missing", &log).await.is_err());
    }
}
