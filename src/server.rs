/// Server setup and initialization
///
/// Wires together all components: storage, scrapers, notifier, execution
/// engine, scheduler and HTTP routes. Provides the main application factory
/// function for creating the Axum app.

use crate::{
    api::{create_execution_routes, create_scheduler_routes, create_workflow_routes, AppState},
    config::Config,
    notify::{LogNotifier, Notifier, WebhookNotifier},
    runtime::{
        engine::ExecutionEngine,
        executor::{ExecutorSettings, NodeExecutor},
        scheduler::SchedulerService,
        tracker::InMemoryRunTracker,
    },
    scraper::{
        linkedin::LinkedInScraper, remoteok::RemoteOkScraper, remotive::RemotiveScraper, ScraperOrchestrator,
    },
    storage::{database, SqliteStore, Store},
};
use anyhow::Result;
use axum::{routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Browser-like agent; job boards reject obvious bots
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Create the main Axum application with all routes
///
/// Opens the SQLite database, registers the job sources, builds the engine
/// and scheduler, and starts the scheduler when autostart is enabled.
pub async fn create_app(config: Config) -> Result<Router> {
    tracing::info!("🗄️ Initializing storage in {}", config.database.data_dir);
    let pool = database::open(&config.database.data_dir).await?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));

    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(config.scraper.timeout_secs))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

    tracing::info!("🔌 Registering job sources");
    let retry = config.scraper.retry_policy();
    let scrapers = ScraperOrchestrator::new(config.scraper.source_delay())
        .register(Arc::new(LinkedInScraper::new(client.clone(), retry.clone())))
        .register(Arc::new(RemoteOkScraper::new(client.clone(), retry.clone())))
        .register(Arc::new(RemotiveScraper::new(client.clone(), retry)));

    let notifier: Arc<dyn Notifier> = match &config.notify.webhook_url {
        Some(url) => {
            tracing::info!("📬 Delivering digests to {}", url);
            Arc::new(WebhookNotifier::new(client, url.clone()))
        }
        None => {
            tracing::info!("📬 No notification webhook configured, digests will be logged");
            Arc::new(LogNotifier)
        }
    };

    let state = build_state(store, scrapers, notifier, config.scraper.executor_settings()).await?;

    if config.scheduler.autostart {
        tracing::info!("🚀 Starting scheduler");
        let scheduler = Arc::clone(&state.scheduler);
        tokio::spawn(async move {
            if let Err(e) = scheduler.start().await {
                tracing::error!("❌ Failed to start scheduler: {}", e);
            }
        });
    }

    Ok(router(state))
}

/// Assemble engine, tracker and scheduler around the given collaborators.
pub async fn build_state(
    store: Arc<dyn Store>,
    scrapers: ScraperOrchestrator,
    notifier: Arc<dyn Notifier>,
    settings: ExecutorSettings,
) -> Result<AppState> {
    tracing::info!("⚙️ Initializing node executor ({} source(s))", scrapers.source_ids().len());
    let executor = Arc::new(NodeExecutor::new(Arc::new(scrapers), notifier, settings));

    tracing::info!("🚀 Initializing execution engine");
    let engine = Arc::new(ExecutionEngine::new(
        Arc::clone(&store),
        Arc::new(InMemoryRunTracker::new()),
        executor,
    ));

    tracing::info!("⏰ Initializing scheduler service");
    let scheduler = Arc::new(
        SchedulerService::new(Arc::clone(&engine))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to initialize scheduler: {}", e))?,
    );

    Ok(AppState {
        store,
        engine,
        scheduler,
    })
}

/// HTTP router over an assembled state
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .merge(create_workflow_routes())
        .merge(create_execution_routes())
        .merge(create_scheduler_routes())
        .with_state(state)
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting jobflow server...");

    let app = create_app(config.clone()).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "ok"
}
