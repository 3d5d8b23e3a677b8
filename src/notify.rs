/// Notification delivery
///
/// The `daily-email` node hands its job list to a [`Notifier`]. Rendering and
/// mail transport live outside this service: [`WebhookNotifier`] posts a JSON
/// digest to a relay endpoint, [`LogNotifier`] only logs it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::scraper::JobRecord;

/// Payload delivered for one notify node.
#[derive(Debug, Clone, Serialize)]
pub struct JobDigest {
    pub workflow_id: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub job_count: usize,
    pub jobs: Vec<JobRecord>,
}

impl JobDigest {
    pub fn new(workflow_id: &str, recipients: Vec<String>, jobs: Vec<JobRecord>) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            subject: format!("{} new job posting(s) from workflow {}", jobs.len(), workflow_id),
            job_count: jobs.len(),
            recipients,
            jobs,
        }
    }
}

/// Delivery collaborator; an error fails the notify node.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, digest: &JobDigest) -> Result<()>;
}

/// POSTs the digest as JSON; any non-2xx response is a delivery failure.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, digest: &JobDigest) -> Result<()> {
        tracing::info!("📧 Sending digest of {} job(s) to {} recipient(s)",
            digest.job_count, digest.recipients.len());

        let response = self
            .client
            .post(&self.url)
            .json(digest)
            .send()
            .await
            .with_context(|| format!("notification relay {} unreachable", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("notification relay returned {}: {}", status, body);
        }
        Ok(())
    }
}

/// Logs digests instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, digest: &JobDigest) -> Result<()> {
        tracing::info!("📭 [log notifier] '{}' → {}", digest.subject, digest.recipients.join(", "));
        for job in &digest.jobs {
            tracing::debug!("  • {} at {} ({})", job.title, job.company, job.url);
        }
        Ok(())
    }
}

/// Keeps every digest in memory; handy for wiring checks.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<JobDigest>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<JobDigest> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, digest: &JobDigest) -> Result<()> {
        self.sent.lock().await.push(digest.clone());
        Ok(())
    }
}
