/// Node handlers
///
/// One handler per [`NodeSpec`] variant, dispatched through a single
/// `execute_node` entry point. Handlers mutate the shared
/// [`ExecutionContext`]; an error aborts the run at this node.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;

use crate::notify::{JobDigest, Notifier};
use crate::runtime::context::ExecutionContext;
use crate::runtime::normalize::normalize_jobs;
use crate::scraper::{ScrapeConfig, ScraperOrchestrator};
use crate::workflow::types::{Node, NodeSpec, NotifyConfig, SourceConfig};
use crate::workflow::FilterCriteria;

/// Failure inside a handler; the engine adds node id and type.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Required configuration is missing or points nowhere
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("{0}")]
    Failed(String),
}

/// Knobs shared by every handler.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Hard cap on records a single source node may add
    pub source_cap: usize,
    /// Per-source scrape timeout
    pub scrape_timeout: Duration,
    /// Normalized descriptions are cut to this many characters
    pub max_description: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            source_cap: 50,
            scrape_timeout: Duration::from_secs(30),
            max_description: 1000,
        }
    }
}

/// Runs individual nodes against an execution context.
pub struct NodeExecutor {
    scrapers: Arc<ScraperOrchestrator>,
    notifier: Arc<dyn Notifier>,
    settings: ExecutorSettings,
}

impl NodeExecutor {
    pub fn new(scrapers: Arc<ScraperOrchestrator>, notifier: Arc<dyn Notifier>, settings: ExecutorSettings) -> Self {
        Self {
            scrapers,
            notifier,
            settings,
        }
    }

    pub fn scrapers(&self) -> &ScraperOrchestrator {
        &self.scrapers
    }

    /// Execute one node, mutating `context.jobs`.
    pub async fn execute_node(&self, node: &Node, context: &mut ExecutionContext) -> Result<(), NodeError> {
        tracing::debug!("🚀 Node '{}' ({}) starting with {} job(s)",
            node.id, node.data.type_tag(), context.jobs.len());

        match &node.data {
            NodeSpec::Trigger => {
                tracing::info!("🎬 Run {} of '{}' started", context.execution_id, context.workflow_id);
                Ok(())
            }
            NodeSpec::Source(config) => self.run_source(config, context).await,
            NodeSpec::Normalize(config) => {
                normalize_jobs(&mut context.jobs, config.dedupe, self.settings.max_description);
                Ok(())
            }
            NodeSpec::Filter(criteria) => {
                run_filter(criteria, context);
                Ok(())
            }
            NodeSpec::Notify(config) => self.run_notify(config, context).await,
        }
    }

    async fn run_source(&self, config: &SourceConfig, context: &mut ExecutionContext) -> Result<(), NodeError> {
        let source_id = config
            .source_id
            .as_deref()
            .ok_or_else(|| NodeError::Configuration("job-source node requires a sourceId".to_string()))?;

        if !self.scrapers.has_source(source_id) {
            return Err(NodeError::Configuration(format!(
                "unknown source '{}' (available: {})",
                source_id,
                self.scrapers.source_ids().join(", ")
            )));
        }

        let scrape = ScrapeConfig {
            keywords: config.keywords.clone(),
            location: config.location.clone(),
            max_results: self.settings.source_cap,
            timeout: self.settings.scrape_timeout,
        };
        let result = self.scrapers.orchestrate(&[source_id.to_string()], &scrape).await;

        for error in result.errors() {
            tracing::warn!("⚠️ Source node continuing despite error: {}", error);
        }

        let jobs: Vec<_> = result.jobs.into_iter().take(self.settings.source_cap).collect();
        tracing::info!("📥 Source '{}' added {} job(s)", source_id, jobs.len());
        context.jobs.extend(jobs);
        Ok(())
    }

    async fn run_notify(&self, config: &NotifyConfig, context: &mut ExecutionContext) -> Result<(), NodeError> {
        let recipients = config.recipient_list();
        if recipients.is_empty() || context.jobs.is_empty() {
            tracing::info!("📭 Nothing to send ({} recipient(s), {} job(s))", recipients.len(), context.jobs.len());
            return Ok(());
        }

        let digest = JobDigest::new(&context.workflow_id, recipients, context.jobs.clone());
        self.notifier
            .deliver(&digest)
            .await
            .map_err(|e| NodeError::Failed(format!("notification delivery failed: {:#}", e)))
    }
}

fn run_filter(criteria: &FilterCriteria, context: &mut ExecutionContext) {
    let before = context.jobs.len();
    let jobs = std::mem::take(&mut context.jobs);
    context.jobs = criteria.apply(jobs, Utc::now());

    let removed = before - context.jobs.len();
    context.jobs_filtered += removed;
    tracing::info!("🧹 Filter kept {} of {} job(s)", context.jobs.len(), before);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;
    use crate::scraper::{JobRecord, JobScraper, ScrapeError, ScraperResult};
    use crate::workflow::types::NormalizeConfig;
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct ManyJobs(usize);

    #[async_trait]
    impl JobScraper for ManyJobs {
        fn source_id(&self) -> &str {
            "many"
        }

        async fn scrape(&self, config: &ScrapeConfig) -> Result<ScraperResult, ScrapeError> {
            // ignores max_results on purpose
            let jobs: Vec<_> = (0..self.0)
                .map(|i| JobRecord::new(format!("Engineer {i}"), "Acme", "Remote", "https://x", "many"))
                .collect();
            assert_eq!(config.max_results, 3);
            Ok(ScraperResult {
                total_found: jobs.len(),
                jobs,
                source: "many".into(),
                scraped_at: Utc::now(),
                duration: Duration::ZERO,
                errors: vec![],
            })
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn deliver(&self, _digest: &JobDigest) -> anyhow::Result<()> {
            anyhow::bail!("relay down")
        }
    }

    fn executor(notifier: Arc<dyn Notifier>) -> NodeExecutor {
        let scrapers = ScraperOrchestrator::new(Duration::ZERO).register(Arc::new(ManyJobs(10)));
        NodeExecutor::new(
            Arc::new(scrapers),
            notifier,
            ExecutorSettings {
                source_cap: 3,
                ..Default::default()
            },
        )
    }

    fn context() -> ExecutionContext {
        ExecutionContext::new("wf-1", "exec-1", CancellationToken::new())
    }

    fn source(source_id: Option<&str>) -> Node {
        Node::new(
            "src",
            NodeSpec::Source(SourceConfig {
                source_id: source_id.map(str::to_string),
                keywords: "engineer".into(),
                location: "Remote".into(),
            }),
        )
    }

    #[tokio::test]
    async fn source_output_is_capped() {
        let executor = executor(Arc::new(RecordingNotifier::new()));
        let mut ctx = context();
        executor.execute_node(&source(Some("many")), &mut ctx).await.unwrap();
        assert_eq!(ctx.jobs.len(), 3);
    }

    #[tokio::test]
    async fn source_without_id_is_a_configuration_error() {
        let executor = executor(Arc::new(RecordingNotifier::new()));
        let mut ctx = context();

        let missing = executor.execute_node(&source(None), &mut ctx).await;
        assert!(matches!(missing, Err(NodeError::Configuration(_))));

        let unknown = executor.execute_node(&source(Some("monster")), &mut ctx).await;
        assert!(matches!(unknown, Err(NodeError::Configuration(msg)) if msg.contains("monster")));
    }

    #[tokio::test]
    async fn filter_counts_removed_jobs() {
        let executor = executor(Arc::new(RecordingNotifier::new()));
        let mut ctx = context();
        ctx.jobs = vec![
            JobRecord::new("Backend Engineer", "Acme", "Remote", "https://x", "many"),
            JobRecord::new("Designer", "Acme", "Remote", "https://x", "many"),
        ];
        let node = Node::new("f", NodeSpec::Filter(FilterCriteria::parse(&["Title: engineer"]).unwrap()));

        executor.execute_node(&node, &mut ctx).await.unwrap();
        assert_eq!(ctx.jobs.len(), 1);
        assert_eq!(ctx.jobs_filtered, 1);
    }

    #[tokio::test]
    async fn notify_skips_empty_input_and_fails_on_delivery_error() {
        let node = Node::new("e", NodeSpec::Notify(NotifyConfig { recipients: "a@b.com".into() }));
        let failing = executor(Arc::new(FailingNotifier));

        let mut empty = context();
        failing.execute_node(&node, &mut empty).await.unwrap();

        let mut ctx = context();
        ctx.jobs = vec![JobRecord::new("Engineer", "Acme", "Remote", "https://x", "many")];
        let err = failing.execute_node(&node, &mut ctx).await.unwrap_err();
        assert!(err.to_string().contains("relay down"));

        let recorder = RecordingNotifier::new();
        let ok = executor(Arc::new(recorder.clone()));
        let no_recipients = Node::new("e", NodeSpec::Notify(NotifyConfig { recipients: " , ".into() }));
        ok.execute_node(&no_recipients, &mut ctx).await.unwrap();
        ok.execute_node(&node, &mut ctx).await.unwrap();
        assert_eq!(recorder.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn normalize_runs_in_place() {
        let executor = executor(Arc::new(RecordingNotifier::new()));
        let mut ctx = context();
        ctx.jobs = vec![
            JobRecord::new("Engineer", "Acme", "Remote", "https://x", "many"),
            JobRecord::new(" engineer ", "ACME", "Remote", "https://y", "many"),
        ];
        let node = Node::new("n", NodeSpec::Normalize(NormalizeConfig::default()));
        executor.execute_node(&node, &mut ctx).await.unwrap();
        assert_eq!(ctx.jobs.len(), 1);
    }
}
