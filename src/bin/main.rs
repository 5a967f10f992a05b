use compliance_agent::{
    agent::Orchestrator,
    config::Settings,
    models::{Attachment, ChatRequest},
    normalizer::mime_type_for,
};
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: compliance-ask <question> [attachment-path]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Logs go to stderr so the answer on stdout stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(question) = args.next().filter(|q| !q.trim().is_empty()) else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    let attachment = match args.next() {
        Some(path) => Some(read_attachment(Path::new(&path)).await?),
        None => None,
    };

    let settings = Settings::from_env()?;
    let orchestrator = Orchestrator::from_settings(&settings).await?;

    info!(question = %question, "Asking compliance agent");

    let reply = orchestrator
        .answer(ChatRequest {
            message: question,
            attachment,
        })
        .await;

    println!("\n=== ANSWER ===");
    println!("{}", reply.reply);
    if !reply.sources.is_empty() {
        println!("\nSources:");
        for (i, source) in reply.sources.iter().enumerate() {
            println!("  {}: {}", i + 1, source);
        }
    }

    Ok(())
}

async fn read_attachment(path: &Path) -> std::io::Result<Attachment> {
    let bytes = tokio::fs::read(path).await?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());

    Ok(Attachment {
        mime_type: mime_type_for(&filename).to_string(),
        bytes,
        filename,
    })
}
