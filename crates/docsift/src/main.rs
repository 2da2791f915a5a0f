use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;

use docsift::config::{default_config_path, load_config};
use docsift::logging::init_logging;
use docsift::store::{Job, JobStatus, TaskResult};
use docsift::{AppContext, Config, DocsiftError, EventKind};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Parser)]
#[command(name = "docsift", version, about = "Run parallel analyses over a document")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a plain-text document with every configured agent.
    Analyze {
        /// Document to analyze.
        file: PathBuf,
        /// Config file (defaults to the platform config directory).
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Print the final job as pretty JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Analyze { file, config, json } => match analyze(&file, config, json).await {
            Ok(job) if job.status == JobStatus::Completed => ExitCode::SUCCESS,
            Ok(_) => ExitCode::from(2),
            Err(e) => {
                eprintln!("error: {}", e);
                ExitCode::FAILURE
            }
        },
    }
}

fn resolve_config(explicit: Option<PathBuf>) -> Result<Config, DocsiftError> {
    if let Some(path) = explicit {
        return Ok(load_config(path)?);
    }
    match default_config_path() {
        Some(path) if path.exists() => Ok(load_config(path)?),
        _ => Ok(Config::default()),
    }
}

async fn analyze(file: &Path, config: Option<PathBuf>, json: bool) -> Result<Job, DocsiftError> {
    let config = resolve_config(config)?;
    init_logging(&config.logging)?;

    let text = tokio::fs::read_to_string(file)
        .await
        .map_err(|source| DocsiftError::ReadInput {
            path: file.to_path_buf(),
            source,
        })?;
    let filename = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());

    // Agents run in parallel, each bounded by the agent timeout.
    let wait_limit = config.agent_timeout() * 2 + Duration::from_secs(5);
    let ctx = AppContext::from_config(config)?;

    let document = ctx.service.register_document(
        &filename,
        &file.display().to_string(),
        text.len() as u64,
        text,
    )?;

    let mut events = ctx.progress.subscribe();
    let ticket = ctx.service.request_analysis(&document.id)?;
    eprintln!("{} ({})", ticket.message, ticket.job_id);

    if ticket.scheduled {
        let job_id = ticket.job_id.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) if event.job_id == job_id => {
                        match &event.task {
                            Some(task) => eprintln!(
                                "[{:>6.2}%] {} {}",
                                event.progress,
                                task,
                                event.message
                            ),
                            None => eprintln!("[{:>6.2}%] {}", event.progress, event.message),
                        }
                        if matches!(event.kind, EventKind::JobFinished | EventKind::JobFailed) {
                            break;
                        }
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    let job = ctx
        .service
        .wait_for_completion(&ticket.job_id, POLL_INTERVAL, wait_limit)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&job)?);
    } else {
        print_summary(&job);
    }
    Ok(job)
}

fn print_summary(job: &Job) {
    println!("Job {} for {}: {}", job.id, job.document_id, job.status);
    for (task, result) in &job.results {
        match result {
            TaskResult::Success(_) => println!("  {:<20} ok", task),
            TaskResult::Error { error } => println!("  {:<20} failed: {}", task, error),
        }
    }
    for (key, message) in &job.error_messages {
        if !job.results.contains_key(key) {
            println!("  {:<20} {}", key, message);
        }
    }
    if let Some(warning) = job.metadata.as_ref().and_then(|m| m.warning.as_deref()) {
        println!("Warning: {}", warning);
    }
}
