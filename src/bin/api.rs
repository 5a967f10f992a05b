use compliance_agent::{agent::Orchestrator, api::start_server, config::Settings};
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

    let settings = Settings::from_env()?;
    if settings.gemini_api_key.is_empty() {
        eprintln!("⚠️  GEMINI_API_KEY not set in .env");
        eprintln!("📌 Every chat request will fail until it is configured");
    }

    info!("🚀 Compliance Agent - API Server");
    info!("📍 Port: {}", settings.port);
    info!(
        model = %settings.gemini_model,
        index = if settings.database_url.is_some() { "pgvector" } else { "json" },
        "Configuration loaded"
    );

    let orchestrator = Arc::new(Orchestrator::from_settings(&settings).await?);

    info!("✅ Orchestrator initialized");
    info!("📡 Starting API server...");

    start_server(orchestrator, settings.port).await?;

    Ok(())
}
