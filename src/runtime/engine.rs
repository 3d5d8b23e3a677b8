/// Execution orchestrator
///
/// Owns the run lifecycle of a workflow: claim the workflow (and its owner) in
/// the [`RunTracker`], check it is runnable, persist a `running` execution,
/// drive the topologically sorted nodes through the [`NodeExecutor`], then
/// finalize the execution and release the claim whatever the outcome.
///
/// Cancellation is cooperative: the token is checked before each node, never
/// while a handler is running.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::error::{EngineError, EngineResult, STOPPED_BY_USER};
use crate::runtime::context::{Execution, ExecutionContext, NodeLog, RunOutcome, TriggeredBy};
use crate::runtime::executor::{NodeError, NodeExecutor};
use crate::runtime::sorter;
use crate::runtime::tracker::{RunTracker, RunningWorkflow};
use crate::storage::{ExecutionStore, Store, WorkflowStore};
use crate::workflow::Workflow;

/// Result of a stop request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StopOutcome {
    Stopped { execution_id: String },
    NotRunning,
}

/// A claimed, validated run whose execution row exists.
struct PreparedRun {
    workflow: Workflow,
    claim: RunningWorkflow,
    execution: Execution,
}

/// Drives workflow runs and enforces run exclusivity.
pub struct ExecutionEngine {
    store: Arc<dyn Store>,
    tracker: Arc<dyn RunTracker>,
    executor: Arc<NodeExecutor>,
}

impl ExecutionEngine {
    pub fn new(store: Arc<dyn Store>, tracker: Arc<dyn RunTracker>, executor: Arc<NodeExecutor>) -> Self {
        Self {
            store,
            tracker,
            executor,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Run a workflow to the end and return its finalized execution.
    ///
    /// Start rejections (unknown, conflicting, expired, inactive) are errors.
    /// A run that fails inside a node is returned as `Ok` with status `failed`.
    pub async fn execute(&self, workflow_id: &str, triggered_by: TriggeredBy) -> EngineResult<Execution> {
        let prepared = self.prepare(workflow_id, triggered_by).await?;
        self.drive(prepared).await
    }

    /// Start a run in the background and return its `running` execution.
    pub async fn spawn_execution(
        self: &Arc<Self>,
        workflow_id: &str,
        triggered_by: TriggeredBy,
    ) -> EngineResult<Execution> {
        let prepared = self.prepare(workflow_id, triggered_by).await?;
        let started = prepared.execution.clone();

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let workflow_id = prepared.workflow.id.clone();
            if let Err(e) = engine.drive(prepared).await {
                tracing::error!("❌ Background run of '{}' could not be recorded: {}", workflow_id, e);
            }
        });

        Ok(started)
    }

    /// Stop the in-flight run of `workflow_id`, if any.
    pub async fn stop(&self, workflow_id: &str) -> EngineResult<StopOutcome> {
        let Some(run) = self.tracker.get(workflow_id).await else {
            tracing::info!("🛑 Stop requested for '{}' but it is not running", workflow_id);
            return Ok(StopOutcome::NotRunning);
        };

        run.cancel.cancel();

        if !run.execution_id.is_empty() {
            let outcome = RunOutcome::failed(STOPPED_BY_USER, 0, 0);
            if self.store.finalize(&run.execution_id, &outcome).await? {
                tracing::info!("🛑 Execution {} of '{}' stopped by user", run.execution_id, workflow_id);
            }
        }

        self.tracker.end(workflow_id, &run.run_id).await;
        Ok(StopOutcome::Stopped {
            execution_id: run.execution_id,
        })
    }

    /// Snapshot of the in-flight run of `workflow_id`.
    pub async fn status(&self, workflow_id: &str) -> Option<RunningWorkflow> {
        self.tracker.get(workflow_id).await
    }

    /// All in-flight runs, oldest first.
    pub async fn running(&self) -> Vec<RunningWorkflow> {
        self.tracker.list().await
    }

    async fn prepare(&self, workflow_id: &str, triggered_by: TriggeredBy) -> EngineResult<PreparedRun> {
        let workflow = self
            .store
            .get_workflow(workflow_id)
            .await?
            .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))?;

        let claim = self
            .tracker
            .try_begin(&workflow.id, workflow.owner_id.as_deref())
            .await?;

        let execution = match self.admit(&workflow, triggered_by).await {
            Ok(execution) => execution,
            Err(e) => {
                self.tracker.end(&workflow.id, &claim.run_id).await;
                tracing::warn!("⛔ Run of '{}' rejected: {}", workflow.id, e);
                return Err(e);
            }
        };

        self.tracker
            .attach_execution(&workflow.id, &claim.run_id, &execution.id)
            .await;

        tracing::info!("🚀 Execution {} of '{}' started ({})", execution.id, workflow.id, triggered_by);
        Ok(PreparedRun {
            workflow,
            claim,
            execution,
        })
    }

    /// Runnable checks, then persist the `running` row.
    async fn admit(&self, workflow: &Workflow, triggered_by: TriggeredBy) -> EngineResult<Execution> {
        if !workflow.is_published() {
            return Err(EngineError::NotActive {
                workflow_id: workflow.id.clone(),
                reason: "workflow is not published".to_string(),
            });
        }

        if let Some(deactivates_at) = workflow.deactivates_at.filter(|_| workflow.is_expired_at(Utc::now())) {
            if workflow.is_active {
                self.store.set_active(&workflow.id, false).await?;
                tracing::info!("⌛ Workflow '{}' expired at {}, deactivated", workflow.id, deactivates_at);
            }
            return Err(EngineError::Expired {
                workflow_id: workflow.id.clone(),
                deactivates_at,
            });
        }

        if !workflow.is_active {
            return Err(EngineError::NotActive {
                workflow_id: workflow.id.clone(),
                reason: "workflow is not active".to_string(),
            });
        }

        Ok(self.store.create_running(&workflow.id, triggered_by).await?)
    }

    /// Run the nodes, finalize, and release the claim.
    async fn drive(&self, prepared: PreparedRun) -> EngineResult<Execution> {
        let PreparedRun {
            workflow,
            claim,
            execution,
        } = prepared;

        let result = self.run_nodes(&workflow, &claim, &execution).await;
        self.tracker.end(&workflow.id, &claim.run_id).await;
        result
    }

    async fn run_nodes(
        &self,
        workflow: &Workflow,
        claim: &RunningWorkflow,
        execution: &Execution,
    ) -> EngineResult<Execution> {
        let sorted = sorter::sort(&workflow.nodes, &workflow.edges);
        if !sorted.excluded.is_empty() {
            tracing::warn!("⚠️ Workflow '{}' has nodes on a cycle that will not run: {:?}",
                workflow.id, sorted.excluded);
        }
        tracing::debug!("📋 Execution order: {:?}", sorted.ordered.iter().map(|n| &n.id).collect::<Vec<_>>());

        let mut context = ExecutionContext::new(&workflow.id, &execution.id, claim.cancel.clone());
        let mut failure: Option<String> = None;

        for (step, node) in sorted.ordered.iter().enumerate() {
            if context.cancel.is_cancelled() {
                tracing::info!("🛑 Execution {} cancelled before node '{}'", execution.id, node.id);
                failure = Some(EngineError::Cancelled.to_string());
                break;
            }

            tracing::info!("📍 Step {}/{}: node '{}' ({})",
                step + 1, sorted.ordered.len(), node.id, node.data.type_tag());

            let mut log = NodeLog::start(&node.id, node.data.type_tag(), context.jobs.len());
            match self.executor.execute_node(node, &mut context).await {
                Ok(()) => log.complete(context.jobs.len()),
                Err(e) => {
                    let error = node_failure(node.id.clone(), node.data.type_tag(), e);
                    log.fail(context.jobs.len(), error.to_string());
                    failure = Some(error.to_string());
                }
            }

            if let Err(e) = self.store.append_node_log(&execution.id, &log).await {
                tracing::warn!("⚠️ Could not persist log of node '{}': {}", node.id, e);
            }
            context.logs.push(log);

            if failure.is_some() {
                break;
            }
        }

        let outcome = match &failure {
            None => RunOutcome::completed(context.jobs.len(), context.jobs_filtered),
            Some(error) => RunOutcome::failed(error.clone(), context.jobs.len(), context.jobs_filtered),
        };

        let finalized = self.store.finalize(&execution.id, &outcome).await?;
        match (&failure, finalized) {
            (_, false) => tracing::info!("ℹ️ Execution {} was already finalized (stopped)", execution.id),
            (None, true) => {
                self.store.record_run(&workflow.id, outcome.completed_at).await?;
                tracing::info!("🎉 Execution {} of '{}' completed: {} job(s), {} filtered out",
                    execution.id, workflow.id, outcome.jobs_scraped, outcome.jobs_filtered);
            }
            (Some(error), true) => {
                tracing::error!("❌ Execution {} of '{}' failed: {}", execution.id, workflow.id, error);
            }
        }

        let stored = self.store.get_execution(&execution.id).await?;
        Ok(stored.unwrap_or_else(|| {
            let mut fallback = execution.clone();
            fallback.finish(&outcome);
            fallback.node_logs = context.logs;
            fallback
        }))
    }
}

fn node_failure(node_id: String, node_type: &str, error: NodeError) -> EngineError {
    match error {
        NodeError::Configuration(message) => EngineError::Configuration { node_id, message },
        NodeError::Failed(message) => EngineError::NodeFailed {
            node_id,
            node_type: node_type.to_string(),
            message,
        },
    }
}
