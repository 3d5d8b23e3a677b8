/// Recurring trigger scheduler
///
/// Keeps a registry `workflow id → ScheduledEntry` for every published,
/// active, unexpired workflow that has a schedule tag, and arms one
/// tokio-cron-scheduler job per entry while the service is running. Jobs fire
/// the execution engine with `TriggeredBy::Schedule`; a failed run is logged
/// and never disarms the entry. An hourly sweep deactivates expired workflows
/// and rebuilds the registry.
///
/// `stop()` disarms jobs but keeps the registry so `start()` resumes cleanly.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};
use tokio::sync::{Mutex, RwLock};
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::runtime::{context::TriggeredBy, engine::ExecutionEngine};
use crate::storage::{Store, WorkflowStore};
use crate::workflow::{ScheduleTag, Workflow};

/// Expired-activation sweep, every hour on the hour (UTC)
pub const SWEEP_SCHEDULE: &str = "0 0 * * * *";

/// One workflow's recurring trigger.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledEntry {
    pub workflow_id: String,
    pub schedule: ScheduleTag,
    /// Armed job handle; `None` while the scheduler is stopped
    #[serde(skip)]
    pub job_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub scheduled_count: usize,
    pub entries: Vec<ScheduledEntry>,
}

#[derive(Debug, Default)]
struct Lifecycle {
    running: bool,
    /// The cron backend can only be started once per process
    backend_started: bool,
    sweep_job: Option<Uuid>,
}

pub struct SchedulerService {
    scheduler: Arc<RwLock<JobScheduler>>,
    entries: RwLock<HashMap<String, ScheduledEntry>>,
    /// Serializes start/stop/refresh/schedule calls
    lifecycle: Mutex<Lifecycle>,
    store: Arc<dyn Store>,
    engine: Arc<ExecutionEngine>,
}

impl SchedulerService {
    pub async fn new(engine: Arc<ExecutionEngine>) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler: Arc::new(RwLock::new(scheduler)),
            entries: RwLock::new(HashMap::new()),
            lifecycle: Mutex::new(Lifecycle::default()),
            store: Arc::clone(engine.store()),
            engine,
        })
    }

    /// Load every eligible workflow, arm its trigger and the hourly sweep.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.running {
            tracing::debug!("⏰ Scheduler already running");
            return Ok(());
        }

        tracing::info!("⏰ Starting workflow scheduler");
        self.load_registry().await?;
        self.arm_all().await?;
        lifecycle.sweep_job = Some(self.arm_sweep().await?);

        if !lifecycle.backend_started {
            self.scheduler.read().await.start().await?;
            lifecycle.backend_started = true;
        }
        lifecycle.running = true;

        tracing::info!("✅ Scheduler started with {} workflow(s)", self.entries.read().await.len());
        Ok(())
    }

    /// Disarm every trigger; the registry is kept.
    pub async fn stop(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if !lifecycle.running {
            tracing::debug!("⏹️ Scheduler already stopped");
            return Ok(());
        }

        self.disarm_all().await;
        if let Some(sweep) = lifecycle.sweep_job.take() {
            self.remove_job(sweep, "expiry sweep").await;
        }
        lifecycle.running = false;

        tracing::info!("⏹️ Scheduler stopped ({} entr(ies) kept)", self.entries.read().await.len());
        Ok(())
    }

    /// Tear down and rebuild the registry from storage.
    pub async fn refresh(&self) -> Result<()> {
        let lifecycle = self.lifecycle.lock().await;

        self.load_registry().await?;
        if lifecycle.running {
            self.arm_all().await?;
        }

        tracing::info!("🔄 Scheduler refreshed: {} workflow(s) scheduled", self.entries.read().await.len());
        Ok(())
    }

    /// Replace any entry for this workflow; returns whether it is now scheduled.
    pub async fn schedule_workflow(&self, workflow: &Workflow) -> Result<bool> {
        let lifecycle = self.lifecycle.lock().await;
        self.remove_entry(&workflow.id).await;

        let schedule = match workflow.schedule {
            Some(schedule) if workflow.is_schedulable_at(Utc::now()) => schedule,
            _ => {
                tracing::debug!("📋 Workflow '{}' is not eligible for scheduling", workflow.id);
                return Ok(false);
            }
        };

        let job_id = if lifecycle.running {
            Some(self.arm(&workflow.id, schedule).await?)
        } else {
            None
        };

        self.entries.write().await.insert(
            workflow.id.clone(),
            ScheduledEntry {
                workflow_id: workflow.id.clone(),
                schedule,
                job_id,
            },
        );

        tracing::info!("📅 Workflow '{}' scheduled ({})", workflow.id, schedule);
        Ok(true)
    }

    /// Disarm and forget a workflow's trigger; returns whether one existed.
    pub async fn unschedule_workflow(&self, workflow_id: &str) -> bool {
        let _lifecycle = self.lifecycle.lock().await;
        self.remove_entry(workflow_id).await
    }

    /// Deactivate every active workflow whose window has elapsed, then refresh.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut expired = 0;

        for workflow in self.store.list_workflows().await? {
            if workflow.is_active && workflow.is_expired_at(now) {
                self.store.set_active(&workflow.id, false).await?;
                tracing::info!("⌛ Deactivated expired workflow '{}'", workflow.id);
                expired += 1;
            }
        }

        self.refresh().await?;
        Ok(expired)
    }

    pub async fn status(&self) -> SchedulerStatus {
        let is_running = self.lifecycle.lock().await.running;
        let mut entries: Vec<_> = self.entries.read().await.values().cloned().collect();
        entries.sort_by(|a, b| a.workflow_id.cmp(&b.workflow_id));

        SchedulerStatus {
            is_running,
            scheduled_count: entries.len(),
            entries,
        }
    }

    /// Clear the registry (disarming jobs) and refill it from storage.
    async fn load_registry(&self) -> Result<()> {
        self.disarm_all().await;

        let now = Utc::now();
        let workflows = self.store.list_workflows().await?;
        let mut entries = self.entries.write().await;
        entries.clear();

        for workflow in workflows {
            if let Some(schedule) = workflow.schedule.filter(|_| workflow.is_schedulable_at(now)) {
                entries.insert(
                    workflow.id.clone(),
                    ScheduledEntry {
                        workflow_id: workflow.id,
                        schedule,
                        job_id: None,
                    },
                );
            }
        }

        tracing::debug!("📊 Loaded {} schedulable workflow(s) from storage", entries.len());
        Ok(())
    }

    async fn arm_all(&self) -> Result<()> {
        let mut entries = self.entries.write().await;
        for entry in entries.values_mut() {
            if entry.job_id.is_none() {
                entry.job_id = Some(self.arm(&entry.workflow_id, entry.schedule).await?);
            }
        }
        Ok(())
    }

    async fn disarm_all(&self) {
        let mut entries = self.entries.write().await;
        for entry in entries.values_mut() {
            if let Some(job_id) = entry.job_id.take() {
                self.remove_job(job_id, &entry.workflow_id).await;
            }
        }
    }

    async fn remove_entry(&self, workflow_id: &str) -> bool {
        let removed = self.entries.write().await.remove(workflow_id);
        match removed {
            Some(entry) => {
                if let Some(job_id) = entry.job_id {
                    self.remove_job(job_id, workflow_id).await;
                }
                tracing::info!("🗑️ Workflow '{}' unscheduled", workflow_id);
                true
            }
            None => false,
        }
    }

    async fn remove_job(&self, job_id: Uuid, label: &str) {
        let scheduler = self.scheduler.read().await;
        if let Err(e) = scheduler.remove(&job_id).await {
            tracing::warn!("⚠️ Failed to remove job {} from scheduler: {}", label, e);
        } else {
            tracing::debug!("🛑 Removed cron job: {}", label);
        }
    }

    /// Register the recurring job that runs `workflow_id`.
    async fn arm(&self, workflow_id: &str, schedule: ScheduleTag) -> Result<Uuid> {
        let workflow_id_owned = workflow_id.to_string();
        let engine = Arc::clone(&self.engine);

        let job = Job::new_async(schedule.cron_expression(), move |_uuid, _l| {
            let workflow_id = workflow_id_owned.clone();
            let engine = Arc::clone(&engine);

            Box::pin(async move {
                tracing::info!("🔔 Scheduled trigger for '{}'", workflow_id);
                match engine.execute(&workflow_id, TriggeredBy::Schedule).await {
                    Ok(execution) => {
                        tracing::info!("✅ Scheduled run {} of '{}' finished: {}",
                            execution.id, workflow_id, execution.status);
                    }
                    Err(e) => {
                        tracing::warn!("⚠️ Scheduled run of '{}' did not start: {}", workflow_id, e);
                    }
                }
            })
        })?;

        let job_id = self.scheduler.read().await.add(job).await?;
        tracing::debug!("⏰ Armed '{}' ({} → {})", workflow_id, schedule, schedule.cron_expression());
        Ok(job_id)
    }

    async fn arm_sweep(self: &Arc<Self>) -> Result<Uuid> {
        let service: Weak<Self> = Arc::downgrade(self);

        let job = Job::new_async(SWEEP_SCHEDULE, move |_uuid, _l| {
            let service = service.clone();

            Box::pin(async move {
                let Some(service) = service.upgrade() else {
                    return;
                };
                match service.sweep_expired().await {
                    Ok(count) => tracing::info!("🧹 Expiry sweep deactivated {} workflow(s)", count),
                    Err(e) => tracing::error!("❌ Expiry sweep failed: {}", e),
                }
            })
        })?;

        Ok(self.scheduler.read().await.add(job).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;
    use crate::runtime::executor::{ExecutorSettings, NodeExecutor};
    use crate::runtime::tracker::InMemoryRunTracker;
    use crate::scraper::ScraperOrchestrator;
    use crate::storage::InMemoryStore;
    use crate::workflow::{Node, NodeSpec, WorkflowStatus};
    use std::time::Duration;

    async fn service() -> (Arc<SchedulerService>, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let executor = NodeExecutor::new(
            Arc::new(ScraperOrchestrator::new(Duration::ZERO)),
            Arc::new(LogNotifier),
            ExecutorSettings::default(),
        );
        let engine = Arc::new(ExecutionEngine::new(
            store.clone(),
            Arc::new(InMemoryRunTracker::new()),
            Arc::new(executor),
        ));
        (Arc::new(SchedulerService::new(engine).await.unwrap()), store)
    }

    fn workflow(id: &str, schedule: Option<ScheduleTag>) -> Workflow {
        Workflow {
            id: id.into(),
            name: id.into(),
            owner_id: None,
            status: WorkflowStatus::Published,
            is_active: true,
            schedule,
            activated_at: None,
            deactivates_at: None,
            last_run_at: None,
            run_count: 0,
            nodes: vec![Node::new("t", NodeSpec::Trigger)],
            edges: vec![],
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn only_eligible_workflows_are_scheduled() {
        let (scheduler, _store) = service().await;

        let mut draft = workflow("draft", Some(ScheduleTag::Weekly));
        draft.status = WorkflowStatus::Draft;

        assert!(scheduler.schedule_workflow(&workflow("daily", Some(ScheduleTag::Daily9am))).await.unwrap());
        assert!(!scheduler.schedule_workflow(&draft).await.unwrap());
        assert!(!scheduler.schedule_workflow(&workflow("manual", None)).await.unwrap());

        let status = scheduler.status().await;
        assert!(!status.is_running);
        assert_eq!(status.scheduled_count, 1);
        assert_eq!(status.entries[0].workflow_id, "daily");

        // rescheduling as ineligible removes the entry
        let mut paused = workflow("daily", Some(ScheduleTag::Daily9am));
        paused.is_active = false;
        assert!(!scheduler.schedule_workflow(&paused).await.unwrap());
        assert_eq!(scheduler.status().await.scheduled_count, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn start_stop_keeps_registry() {
        let (scheduler, store) = service().await;
        store.save_workflow(&workflow("a", Some(ScheduleTag::Daily9am))).await.unwrap();
        store.save_workflow(&workflow("b", Some(ScheduleTag::Daily6pm))).await.unwrap();
        store.save_workflow(&workflow("c", None)).await.unwrap();

        scheduler.start().await.unwrap();
        scheduler.start().await.unwrap();
        let running = scheduler.status().await;
        assert!(running.is_running);
        assert_eq!(running.scheduled_count, 2);
        assert!(running.entries.iter().all(|e| e.job_id.is_some()));

        scheduler.stop().await.unwrap();
        let stopped = scheduler.status().await;
        assert!(!stopped.is_running);
        assert_eq!(stopped.scheduled_count, 2);
        assert!(stopped.entries.iter().all(|e| e.job_id.is_none()));

        scheduler.start().await.unwrap();
        assert!(scheduler.status().await.entries.iter().all(|e| e.job_id.is_some()));

        assert!(scheduler.unschedule_workflow("a").await);
        assert!(!scheduler.unschedule_workflow("a").await);
        assert_eq!(scheduler.status().await.scheduled_count, 1);
        scheduler.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sweep_deactivates_expired_workflows() {
        let (scheduler, store) = service().await;
        let mut expired = workflow("old", Some(ScheduleTag::Weekly));
        expired.deactivates_at = Some(Utc::now() - chrono::Duration::minutes(5));
        store.save_workflow(&expired).await.unwrap();
        store.save_workflow(&workflow("fresh", Some(ScheduleTag::Weekly))).await.unwrap();

        assert_eq!(scheduler.sweep_expired().await.unwrap(), 1);
        assert!(!store.get_workflow("old").await.unwrap().unwrap().is_active);

        let status = scheduler.status().await;
        assert_eq!(status.scheduled_count, 1);
        assert_eq!(status.entries[0].workflow_id, "fresh");
    }
}
