//! Inkpost CLI - submit AI jobs and inspect their status.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use inkpost_assist::{Completion, HttpJobClient, JobClient, PollOptions, PollingCoordinator};
use inkpost_core::{JobOutput, JobStatus, JobSubmission, TaskId, TaskKind, TransformOptions};

/// Inkpost CLI - AI job tool
#[derive(Parser)]
#[command(name = "inkpost")]
#[command(about = "CLI for Inkpost AI jobs", long_about = None)]
struct Cli {
    /// API base URL
    #[arg(short, long, env = "INKPOST_API_URL", default_value = "http://localhost:3000")]
    base_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a job and wait for its result
    Submit {
        /// Job kind (polish, improve, expand, summarize, translate, outline, batch)
        #[arg(short, long)]
        kind: TaskKind,

        /// Text to process
        #[arg(conflicts_with = "file")]
        text: Option<String>,

        /// Read the text from a file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Target language for translate
        #[arg(short, long)]
        language: Option<String>,

        /// Tone for rewriting kinds
        #[arg(long)]
        tone: Option<String>,

        /// Operation to include in a batch job (repeatable)
        #[arg(long = "op")]
        operations: Vec<TaskKind>,

        /// Milliseconds between status checks
        #[arg(long, env = "INKPOST_POLL_INTERVAL_MS", default_value_t = 2000)]
        interval_ms: u64,

        /// Status checks before giving up
        #[arg(long, env = "INKPOST_POLL_MAX_ATTEMPTS", default_value_t = 60)]
        max_attempts: u32,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Get job status
    Status {
        /// Task ID
        task_id: String,

        /// Print the raw status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check API health
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let client = Arc::new(HttpJobClient::new(&cli.base_url));

    match cli.command {
        Commands::Submit {
            kind,
            text,
            file,
            language,
            tone,
            operations,
            interval_ms,
            max_attempts,
            json,
        } => {
            let text = match (text, file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(path)?,
                (None, None) => return Err("provide the text or --file".into()),
            };
            let options = TransformOptions {
                target_language: language,
                tone,
                operations,
            };
            let poll = PollOptions {
                interval: Duration::from_millis(interval_ms),
                max_attempts,
            };
            submit(client, kind, text, options, poll, json).await?;
        }
        Commands::Status { task_id, json } => {
            status(&client, TaskId::new(task_id), json).await?;
        }
        Commands::Health => {
            let healthy = client.health().await?;
            println!("{}: {}", client.base_url(), if healthy { "healthy" } else { "unhealthy" });
            if !healthy {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

async fn submit(
    client: Arc<HttpJobClient>,
    kind: TaskKind,
    text: String,
    options: TransformOptions,
    poll: PollOptions,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let submission = JobSubmission::new(kind, text, options)?;
    let task_id = client.submit(&submission).await?;
    info!(task_id = %task_id, kind = %kind, "Job submitted, waiting for result");

    let coordinator = PollingCoordinator::new(client);
    let (completion, outcome) = Completion::channel();
    coordinator.start(task_id.clone(), kind, poll, completion)?;

    let output = tokio::select! {
        output = outcome => output?,
        _ = tokio::signal::ctrl_c() => {
            coordinator.cancel(&task_id);
            eprintln!("Cancelled job {}", task_id);
            return Ok(());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_output(&output);
    }
    Ok(())
}

async fn status(
    client: &HttpJobClient,
    task_id: TaskId,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let status = client.status(&task_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_status(&task_id, &status);
    }
    Ok(())
}

fn print_output(output: &JobOutput) {
    match output {
        JobOutput::Text(text) | JobOutput::Outline(text) => println!("{}", text),
        JobOutput::Batch(items) => {
            for (i, item) in items.iter().enumerate() {
                match (&item.result, &item.error) {
                    (Some(result), _) => println!("[{}] {}", i + 1, result),
                    (None, Some(error)) => println!("[{}] error: {}", i + 1, error),
                    (None, None) => println!("[{}] (empty)", i + 1),
                }
            }
        }
    }
}

fn print_status(task_id: &TaskId, status: &JobStatus) {
    println!("  ID:         {}", task_id);
    println!("  Status:     {:?}", status.status);
    if let Some(progress) = status.progress {
        println!("  Progress:   {}", progress);
    }
    if let Some(error) = &status.error {
        println!("  Error:      {}", error);
    }
    if let Some(result) = &status.result {
        println!("  Result:     {}", result);
    }
}
