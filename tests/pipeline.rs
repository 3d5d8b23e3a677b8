//! Full run of the trigger → source → normalize → filter → email pipeline.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use jobflow::notify::RecordingNotifier;
use jobflow::runtime::{ExecutionEngine, ExecutorSettings, InMemoryRunTracker, NodeExecutor, NodeStatus};
use jobflow::scraper::{JobRecord, JobScraper, ScrapeConfig, ScrapeError, ScraperOrchestrator, ScraperResult};
use jobflow::storage::{ExecutionStore, InMemoryStore, WorkflowStore};
use jobflow::{ExecutionStatus, TriggeredBy, Workflow};

/// Stands in for the LinkedIn board.
struct FakeLinkedIn;

#[async_trait]
impl JobScraper for FakeLinkedIn {
    fn source_id(&self) -> &str {
        "linkedin"
    }

    async fn scrape(&self, config: &ScrapeConfig) -> Result<ScraperResult, ScrapeError> {
        assert_eq!(config.keywords, "engineer");
        assert_eq!(config.location, "Remote");

        let mut backend = JobRecord::new("Backend  Engineer", "Acme", "Remote", "https://jobs/1", "linkedin");
        backend.posted_at = Some(Utc::now());
        let jobs = vec![
            backend,
            JobRecord::new(" backend engineer ", "ACME", "Remote", "https://jobs/1b", "linkedin"),
            JobRecord::new("Frontend Engineer", "Globex", "Remote", "https://jobs/2", "linkedin"),
            JobRecord::new("Product Designer", "Initech", "Remote", "https://jobs/3", "linkedin"),
        ];

        Ok(ScraperResult {
            total_found: jobs.len(),
            jobs,
            source: "linkedin".into(),
            scraped_at: Utc::now(),
            duration: Duration::ZERO,
            errors: vec![],
        })
    }
}

fn pipeline_definition() -> Workflow {
    serde_json::from_value(json!({
        "id": "remote-engineers",
        "name": "Remote engineering roles",
        "owner_id": "user-1",
        "status": "published",
        "is_active": true,
        "schedule": "daily-9am",
        "nodes": [
            { "id": "trigger", "data": { "type": "trigger" } },
            { "id": "source", "data": {
                "type": "job-source",
                "sourceId": "linkedin",
                "metadata": { "keywords": "engineer", "location": "Remote" }
            } },
            { "id": "normalize", "data": { "type": "normalize-data" } },
            { "id": "filter", "data": {
                "type": "filter",
                "metadata": { "filters": ["Title: engineer"] }
            } },
            { "id": "email", "data": {
                "type": "daily-email",
                "metadata": { "recipients": "a@b.com" }
            } }
        ],
        "edges": [
            { "source": "trigger", "target": "source" },
            { "source": "source", "target": "normalize" },
            { "source": "normalize", "target": "filter" },
            { "source": "filter", "target": "email" }
        ]
    }))
    .unwrap()
}

#[tokio::test]
async fn manual_run_collects_filters_and_notifies() {
    let store = Arc::new(InMemoryStore::new());
    let notifier = RecordingNotifier::new();
    let scrapers = ScraperOrchestrator::new(Duration::ZERO).register(Arc::new(FakeLinkedIn));
    let executor = NodeExecutor::new(Arc::new(scrapers), Arc::new(notifier.clone()), ExecutorSettings::default());
    let engine = ExecutionEngine::new(store.clone(), Arc::new(InMemoryRunTracker::new()), Arc::new(executor));

    let workflow = pipeline_definition();
    workflow.validate().unwrap();
    store.save_workflow(&workflow).await.unwrap();

    let execution = engine.execute("remote-engineers", TriggeredBy::Manual).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.triggered_by, TriggeredBy::Manual);
    assert!(execution.error.is_none());

    let order: Vec<_> = execution.node_logs.iter().map(|log| log.node_id.as_str()).collect();
    assert_eq!(order, ["trigger", "source", "normalize", "filter", "email"]);
    assert!(execution.node_logs.iter().all(|log| log.status == NodeStatus::Completed));

    let filter_log = &execution.node_logs[3];
    assert_eq!(filter_log.input_count, 3);
    assert_eq!(filter_log.output_count, 2);
    assert_eq!(execution.jobs_scraped, filter_log.output_count);
    assert_eq!(execution.jobs_filtered, 1);

    let sent = notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipients, vec!["a@b.com".to_string()]);
    assert_eq!(sent[0].job_count, 2);
    assert_eq!(sent[0].jobs[0].title, "Backend Engineer");

    let history = store.list_executions("remote-engineers", 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, execution.id);

    let stored = store.get_workflow("remote-engineers").await.unwrap().unwrap();
    assert_eq!(stored.run_count, 1);
}
