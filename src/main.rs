use std::net::SocketAddr;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

use tidyd::config::AppConfig;
use tidyd::context::AppContext;
use tidyd::core::{ChecksumAlgorithm, JobState, JobStatus, ProgressEvent};
use tidyd::logging::{self, LogConfig};
use tidyd::rpc::{RpcClient, RpcServer};
use tidyd::workflows::{self, Workflow, WorkflowRequest};

#[derive(Parser)]
#[command(name = "tidyd")]
#[command(about = "Rule-based file organizer with tracked, abortable jobs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    overrides: ConfigArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the JSON-RPC daemon
    Daemon,
    /// Run a workflow in this process and print its progress
    Run(RunArgs),
    /// List jobs on the daemon, or show one
    Jobs { id: Option<String> },
    /// Ask the daemon to abort a job
    Abort { id: String },
    /// Follow a job on the daemon until it finishes
    Watch { id: String },
    /// Print the effective configuration
    Config,
}

/// Command-line overrides layered on top of file and environment config.
#[derive(Args, Serialize)]
struct ConfigArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    rpc_bind: Option<SocketAddr>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    poll_interval_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    checksum: Option<ChecksumAlgorithm>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    android_threshold_mb: Option<u64>,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(long, global = true)]
    verbose: bool,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Args)]
struct RunArgs {
    /// Actually move files. Without this the run is a dry run.
    #[arg(long)]
    apply: bool,

    /// Copy, verify and delete instead of renaming
    #[arg(long)]
    safe: bool,

    #[command(subcommand)]
    workflow: Workflow,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = AppConfig::new(Some(&cli.overrides))?;
    logging::init(LogConfig::from(&config));

    match cli.command {
        Commands::Daemon => run_daemon(config).await.context("Daemon failed")?,
        Commands::Run(args) => return run_local(config, args).await,
        Commands::Jobs { id } => show_jobs(client(&config), id).await?,
        Commands::Abort { id } => abort_job(client(&config), &id).await?,
        Commands::Watch { id } => return watch_job(client(&config), &id).await,
        Commands::Config => print!("{}", config.to_toml()?),
    }

    Ok(ExitCode::SUCCESS)
}

fn client(config: &AppConfig) -> RpcClient {
    RpcClient::new(config.rpc_bind)
}

async fn run_daemon(config: AppConfig) -> Result<()> {
    let ctx = AppContext::new(config);
    let server = RpcServer::bind(ctx.clone(), ctx.config.rpc_bind).await?;

    tokio::select! {
        result = server.start() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested, waiting for running jobs");
            server.shutdown();
        }
    }

    ctx.runner.shutdown().await;
    info!("Daemon stopped");
    Ok(())
}

async fn run_local(config: AppConfig, args: RunArgs) -> Result<ExitCode> {
    let ctx = AppContext::new(config);
    let request = WorkflowRequest {
        workflow: args.workflow,
        dry_run: !args.apply,
        safe_mode: args.safe.then_some(true),
    };

    let handle = workflows::submit(&ctx, request);
    let job_id = handle.id.clone();
    let mut events = ctx.publisher.subscribe(&job_id);

    while let Some(event) = events.recv().await {
        match event {
            ProgressEvent::Snapshot(job) if !job.status.is_terminal() => print_progress(&job),
            _ => break,
        }
    }
    handle.wait().await;

    let job = ctx
        .registry
        .get(&job_id)
        .context("Job disappeared from the registry")?;
    print_json(&job)?;
    Ok(exit_code(&job))
}

async fn show_jobs(client: RpcClient, id: Option<String>) -> Result<()> {
    let result: Value = match id {
        Some(id) => client.call("jobs.get", Some(json!({ "id": id }))).await?,
        None => client.call_no_params("jobs.list").await?,
    };
    print_json(&result)
}

async fn abort_job(client: RpcClient, id: &str) -> Result<()> {
    let result: Value = client.call("jobs.abort", Some(json!({ "id": id }))).await?;
    print_json(&result)
}

async fn watch_job(client: RpcClient, id: &str) -> Result<ExitCode> {
    let job = client.watch(id, |job| print_progress(&job)).await?;
    print_json(&job)?;
    Ok(exit_code(&job))
}

fn print_progress(job: &JobState) {
    println!(
        "[{:>3}%] {}/{} {} {}",
        job.progress, job.current, job.total, job.message, job.current_file
    );
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn exit_code(job: &JobState) -> ExitCode {
    match job.status {
        JobStatus::Completed => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    }
}
