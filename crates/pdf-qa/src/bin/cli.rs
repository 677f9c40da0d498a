//! Command-line client
//!
//! Run with: cargo run -p pdf-qa --bin pdf-qa -- --help

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

use pdf_qa::client::{citation_link, ApiClient, CancelHandle, ClientError, UploadError};
use pdf_qa::config::RagConfig;
use pdf_qa::stack::{build_pipeline, gemini_providers};
use pdf_qa::types::{query::DEFAULT_USER_ID, QueryModel};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "pdf-qa", version, about = "Ask questions about your PDF documents")]
struct Cli {
    /// Base URL of the API
    #[arg(long, env = "PDF_QA_API_URL", default_value = "http://localhost:8000/")]
    api_url: String,

    /// Base URL of the document bucket (default: the API's /files/ route)
    #[arg(long, env = "PDF_QA_BUCKET_URL")]
    bucket_url: Option<String>,

    /// User whose queries and documents are used
    #[arg(long, env = "PDF_QA_USER_ID", default_value = DEFAULT_USER_ID)]
    user_id: String,

    /// Configuration file for local commands
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a question
    Submit { query_text: String },
    /// Show recent queries
    List {
        #[arg(long, default_value_t = 25)]
        count: usize,
    },
    /// Show one query and its answer
    View { query_id: String },
    /// Upload PDF documents
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Load uploaded documents into the local vector store
    Populate {
        /// Clear the user's collection first
        #[arg(long)]
        reset: bool,
    },
    /// Answer a question locally, without the API
    Ask { query_text: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf_qa=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Command::Submit { query_text } => submit(&cli, query_text).await,
        Command::List { count } => list(&cli, *count).await,
        Command::View { query_id } => view(&cli, query_id).await,
        Command::Upload { files } => upload(&cli, files).await,
        Command::Populate { reset } => populate(&cli, *reset).await,
        Command::Ask { query_text } => ask(&cli, query_text).await,
    }
}

fn client(cli: &Cli) -> anyhow::Result<ApiClient> {
    Ok(ApiClient::new(cli.api_url.as_str())?)
}

fn bucket_url(cli: &Cli) -> String {
    cli.bucket_url.clone().unwrap_or_else(|| {
        format!("{}/files/", cli.api_url.trim_end_matches('/'))
    })
}

async fn submit(cli: &Cli, query_text: &str) -> anyhow::Result<()> {
    let item = client(cli)?.submit_query(&cli.user_id, query_text).await?;

    println!("{} {}", style("Submitted").green().bold(), item.query_id);
    println!(
        "View it with: {}",
        style(format!("pdf-qa --user-id {} view {}", cli.user_id, item.query_id)).cyan()
    );
    Ok(())
}

async fn list(cli: &Cli, count: usize) -> anyhow::Result<()> {
    let items = client(cli)?.list_queries(&cli.user_id, count).await?;

    println!("{}", style("Recent Queries").bold().underlined());
    if items.is_empty() {
        println!("No queries yet.");
        return Ok(());
    }

    for item in &items {
        let status = if item.is_complete {
            style("done").green()
        } else {
            style("pending").yellow()
        };
        println!(
            "{}  {:<8} {}  {}",
            style(&item.query_id).dim(),
            status,
            created_label(item),
            item.query_text
        );
    }
    Ok(())
}

fn created_label(item: &QueryModel) -> String {
    chrono::DateTime::from_timestamp(item.created_at, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

async fn view(cli: &Cli, query_id: &str) -> anyhow::Result<()> {
    let item = match client(cli)?.get_query(&cli.user_id, query_id).await {
        Ok(item) => item,
        Err(e) if e.status() == Some(404) => {
            println!("Query {} not found.", query_id);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!("{}", style("Question").bold());
    println!("{}\n", item.query_text);

    let answer = match (&item.answer_text, item.is_complete) {
        (Some(answer), true) => answer,
        _ => {
            println!("Still loading. Please try again later.");
            return Ok(());
        }
    };

    println!("{}", style("Answer").bold());
    println!("{}\n", answer);

    if !item.sources.is_empty() {
        let base = bucket_url(cli);
        println!("{}", style("Sources").bold());
        for source in &item.sources {
            println!(
                "  {}  {}",
                source.label(),
                style(citation_link(&base, &item.user_id, source)).cyan()
            );
        }
    }
    Ok(())
}

async fn upload(cli: &Cli, files: &[PathBuf]) -> anyhow::Result<()> {
    let client = client(cli)?;
    let (handle, signal) = CancelHandle::channel();

    let interrupt = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let bar_style = ProgressStyle::with_template("{msg:30!} [{bar:40.cyan/blue}] {pos:>3}%")?
        .progress_chars("=> ");

    for path in files {
        let bar = ProgressBar::new(100).with_style(bar_style.clone());
        bar.set_message(display_name(path));

        let progress = bar.clone();
        let result = client
            .upload_document(
                &cli.user_id,
                path,
                move |percent| progress.set_position(percent as u64),
                signal.clone(),
            )
            .await;

        match result {
            Ok(response) => {
                bar.finish();
                println!("  {} {}", style("Stored").green(), response.url);
            }
            Err(ClientError::Upload(UploadError::Cancelled)) => {
                bar.abandon();
                println!("{}", style("Upload aborted").yellow());
                return Ok(());
            }
            Err(e) => {
                bar.abandon();
                println!("  {} {}: {}", style("Failed").red(), path.display(), e);
            }
        }

        if handle.is_cancelled() {
            break;
        }
    }
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn local_config(cli: &Cli) -> anyhow::Result<RagConfig> {
    Ok(RagConfig::load(cli.config.as_deref())?)
}

async fn populate(cli: &Cli, reset: bool) -> anyhow::Result<()> {
    let config = local_config(cli)?;
    let (embedder, llm) = gemini_providers(&config)?;
    let pipeline = build_pipeline(&config, embedder, llm)?;

    if reset {
        println!("{}", style("Clearing database").yellow());
    }
    let report = pipeline.ingest(&cli.user_id, reset).await?;

    println!(
        "Loaded {} pages into {} chunks, {} new",
        report.pages, report.chunks, report.added
    );
    Ok(())
}

async fn ask(cli: &Cli, query_text: &str) -> anyhow::Result<()> {
    let config = local_config(cli)?;
    let (embedder, llm) = gemini_providers(&config)?;
    let pipeline = build_pipeline(&config, embedder, llm)?;

    let response = pipeline.process_query(&cli.user_id, query_text).await?;

    println!("{}", response.response_text);
    if !response.sources.is_empty() {
        println!("\n{}", style("Sources").bold());
        for source in &response.sources {
            println!(
                "  {}  {}",
                source.label(),
                style(pipeline.bucket().citation_url(&cli.user_id, source)).cyan()
            );
        }
    }
    Ok(())
}
