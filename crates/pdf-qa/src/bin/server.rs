//! API server binary
//!
//! Run with: cargo run -p pdf-qa --bin pdf-qa-server

use pdf_qa::{config::RagConfig, Stack};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf_qa=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!(
        r#"
╔═══════════════════════════════════════════════════════════╗
║                         PDF Q&A                           ║
║        Answers from your documents, with page links       ║
╚═══════════════════════════════════════════════════════════╝
"#
    );

    let config = RagConfig::load(None)?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Data directory: {}", config.storage.data_dir.display());
    tracing::info!("  - Embedding model: {}", config.embeddings.model);
    tracing::info!("  - LLM model: {}", config.llm.model);
    tracing::info!("  - Chunk size: {}", config.chunking.chunk_size);
    tracing::info!("  - Worker concurrency: {}", config.worker.effective_concurrency());

    let stack = Stack::provision(config).await?;
    let outputs = stack.outputs();

    tracing::info!("FunctionUrl: {}", outputs.function_url);
    tracing::info!("BucketPath: {}", outputs.bucket_path.display());
    tracing::info!("TablePath: {}", outputs.table_path.display());

    println!("\nServer starting...");
    println!("  API: {}", outputs.function_url);
    println!("  Health: {}health", outputs.function_url);
    println!("\nEndpoints:");
    println!("  POST /users/:user_id/queries            - Ask a question");
    println!("  GET  /users/:user_id/queries            - Recent queries");
    println!("  GET  /users/:user_id/queries/:query_id  - One query");
    println!("  POST /users/:user_id/documents          - Upload PDFs");
    println!("\nPress Ctrl+C to stop\n");

    stack.serve().await?;

    Ok(())
}
