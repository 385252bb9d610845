use financial_research_agent::{agent::Orchestrator, api::start_server, config::AgentConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AgentConfig::from_env()?;

    info!("Financial Research Agent - API Server");
    info!("Port: {}", config.api_port);

    let orchestrator = Arc::new(Orchestrator::from_config(&config)?);

    info!("Orchestrator initialized, starting API server");

    start_server(orchestrator, config.api_port).await?;

    Ok(())
}
