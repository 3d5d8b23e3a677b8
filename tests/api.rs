//! HTTP surface against a real listener and an in-memory store.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use jobflow::notify::RecordingNotifier;
use jobflow::runtime::ExecutorSettings;
use jobflow::scraper::{JobRecord, JobScraper, ScrapeConfig, ScrapeError, ScraperOrchestrator, ScraperResult};
use jobflow::server::{build_state, router};
use jobflow::storage::InMemoryStore;

struct Board {
    delay: Duration,
}

#[async_trait]
impl JobScraper for Board {
    fn source_id(&self) -> &str {
        "board"
    }

    async fn scrape(&self, _config: &ScrapeConfig) -> Result<ScraperResult, ScrapeError> {
        tokio::time::sleep(self.delay).await;
        let jobs = vec![JobRecord::new("Backend Engineer", "Acme", "Remote", "https://jobs/1", "board")];
        Ok(ScraperResult {
            total_found: jobs.len(),
            jobs,
            source: "board".into(),
            scraped_at: Utc::now(),
            duration: self.delay,
            errors: vec![],
        })
    }
}

async fn spawn_app(delay: Duration) -> String {
    let scrapers = ScraperOrchestrator::new(Duration::ZERO).register(Arc::new(Board { delay }));
    let state = build_state(
        Arc::new(InMemoryStore::new()),
        scrapers,
        Arc::new(RecordingNotifier::new()),
        ExecutorSettings::default(),
    )
    .await
    .unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    format!("http://{}", addr)
}

fn definition(id: &str, status: &str) -> Value {
    json!({
        "workflow": {
            "id": id,
            "name": "Board watch",
            "status": status,
            "is_active": true,
            "schedule": "weekly",
            "nodes": [
                { "id": "trigger", "data": { "type": "trigger" } },
                { "id": "source", "data": { "type": "job-source", "sourceId": "board",
                    "metadata": { "keywords": "engineer", "location": "Remote" } } },
                { "id": "email", "data": { "type": "daily-email", "metadata": { "recipients": "a@b.com" } } }
            ],
            "edges": [
                { "source": "trigger", "target": "source" },
                { "source": "source", "target": "email" }
            ]
        }
    })
}

async fn wait_for_execution(client: &reqwest::Client, base: &str, execution_id: &str) -> Value {
    for _ in 0..200 {
        let execution: Value = client
            .get(format!("{base}/api/executions/{execution_id}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if execution["status"] != "running" {
            return execution;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("execution {} never finished", execution_id);
}

#[tokio::test(flavor = "multi_thread")]
async fn workflow_crud_and_validation() {
    let base = spawn_app(Duration::ZERO).await;
    let client = reqwest::Client::new();

    let health = client.get(format!("{base}/healthz")).send().await.unwrap();
    assert_eq!(health.text().await.unwrap(), "ok");

    let created = client
        .post(format!("{base}/api/workflows"))
        .json(&definition("wf-1", "published"))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let body: Value = created.json().await.unwrap();
    assert_eq!(body["scheduled"], true);

    let duplicate = client
        .post(format!("{base}/api/workflows"))
        .json(&definition("wf-1", "published"))
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let mut bad_filter = definition("wf-2", "draft");
    bad_filter["workflow"]["nodes"][2] = json!({ "id": "email", "data": {
        "type": "filter", "metadata": { "filters": ["Colour: blue"] } } });
    let rejected = client
        .post(format!("{base}/api/workflows"))
        .json(&bad_filter)
        .send()
        .await
        .unwrap();
    assert!(rejected.status().is_client_error());

    let mut cyclic = definition("wf-3", "draft");
    cyclic["workflow"]["edges"]
        .as_array_mut()
        .unwrap()
        .push(json!({ "source": "email", "target": "trigger" }));
    let rejected = client
        .post(format!("{base}/api/workflows"))
        .json(&cyclic)
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);

    let status: Value = client
        .get(format!("{base}/api/scheduler/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["scheduled_count"], 1);
    assert_eq!(status["entries"][0]["schedule"], "weekly");

    let deleted = client.delete(format!("{base}/api/workflows/wf-1")).send().await.unwrap();
    assert_eq!(deleted.status(), StatusCode::OK);
    let missing = client.get(format!("{base}/api/workflows/wf-1")).send().await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let status: Value = client
        .get(format!("{base}/api/scheduler/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["scheduled_count"], 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn execute_reports_conflicts_and_history() {
    let base = spawn_app(Duration::from_millis(300)).await;
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/api/workflows"))
        .json(&definition("wf-1", "published"))
        .send()
        .await
        .unwrap();

    let started = client
        .post(format!("{base}/api/workflows/wf-1/execute"))
        .json(&json!({ "triggered_by": "api" }))
        .send()
        .await
        .unwrap();
    assert_eq!(started.status(), StatusCode::ACCEPTED);
    let started: Value = started.json().await.unwrap();
    let execution_id = started["execution_id"].as_str().unwrap().to_string();

    let running: Value = client
        .get(format!("{base}/api/workflows/wf-1/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(running["is_running"], true);
    assert_eq!(running["run"]["execution_id"], execution_id.as_str());

    let second = client
        .post(format!("{base}/api/workflows/wf-1/execute"))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);

    let finished = wait_for_execution(&client, &base, &execution_id).await;
    assert_eq!(finished["status"], "completed");
    assert_eq!(finished["triggered_by"], "api");
    assert_eq!(finished["node_logs"].as_array().unwrap().len(), 3);

    let history: Value = client
        .get(format!("{base}/api/workflows/wf-1/executions?limit=5"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.as_array().unwrap().len(), 1);

    let unknown = client
        .post(format!("{base}/api/workflows/ghost/execute"))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn drafts_and_expired_workflows_are_rejected() {
    let base = spawn_app(Duration::ZERO).await;
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/api/workflows"))
        .json(&definition("draft", "draft"))
        .send()
        .await
        .unwrap();
    let draft = client
        .post(format!("{base}/api/workflows/draft/execute"))
        .send()
        .await
        .unwrap();
    assert_eq!(draft.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let mut expired = definition("expired", "published");
    expired["workflow"]["deactivates_at"] = json!((Utc::now() - chrono::Duration::hours(1)).to_rfc3339());
    client
        .post(format!("{base}/api/workflows"))
        .json(&expired)
        .send()
        .await
        .unwrap();
    let gone = client
        .post(format!("{base}/api/workflows/expired/execute"))
        .send()
        .await
        .unwrap();
    assert_eq!(gone.status(), StatusCode::GONE);

    let stored: Value = client
        .get(format!("{base}/api/workflows/expired"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stored["is_active"], false);
}
