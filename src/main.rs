/// jobflow server entry point
///
/// Initializes configuration from the environment and starts the HTTP server.
/// The server provides:
/// - Workflow management and run control at /api/workflows/*
/// - Execution history at /api/executions/{id}
/// - Scheduler control at /api/scheduler/*
/// - Health check at /healthz

use jobflow::{config::Config, server::start_server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
