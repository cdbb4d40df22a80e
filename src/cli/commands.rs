//! CLI command definitions for crunch-agent.
//!
//! `run` processes a named dataset, `next` claims and processes whatever
//! the coordinator hands out next, and `loop` keeps doing that until
//! nothing is left.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tracing::{info, warn};

use crate::coordinator::{Coordinator, CoordinatorConfig, Diagnostics, HttpCoordinator};
use crate::pipeline::{Run, RunConfig, RunResult, DEFAULT_BASE_DIRECTORY};
use crate::storage::{render_listing, StorageBackend, StorageSettings};
use crate::workflow::{Cores, WorkflowKind};

/// Raised by `next` when the coordinator has no unprocessed datasets.
#[derive(Debug, Error)]
#[error("No more datasets to process.")]
pub struct NoDatasets;

/// Agent that processes datasets for a crunch coordinator.
#[derive(Parser)]
#[command(name = "crunch-agent")]
#[command(about = "Claim crunch datasets, run their workflows and sync the results")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Process a dataset.
    Run(RunArgs),

    /// Process the next unprocessed dataset.
    Next(NextArgs),

    /// Process datasets until none are left.
    Loop(NextArgs),

    /// Print the files stored for a dataset.
    Files(FilesArgs),

    /// Print the diagnostics attached to status updates.
    Diagnostics,
}

/// Where the coordinator lives.
#[derive(clap::Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// The URL of the crunch hosted site.
    #[arg(long, env = "CRUNCH_URL")]
    pub url: Option<String>,

    /// An access token for a user on the hosted site.
    #[arg(long, env = "CRUNCH_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Path to a JSON or YAML file describing the storage backend.
    #[arg(long, env = "CRUNCH_STORAGE_SETTINGS")]
    pub storage_settings: PathBuf,
}

impl ConnectionArgs {
    fn coordinator(&self) -> anyhow::Result<Arc<dyn Coordinator>> {
        let config = CoordinatorConfig::new(
            self.url.clone().unwrap_or_default(),
            self.token.clone().unwrap_or_default(),
        )?;
        Ok(Arc::new(HttpCoordinator::new(config)?))
    }

    fn storage(&self) -> anyhow::Result<Arc<dyn StorageBackend>> {
        Ok(StorageSettings::load(&self.storage_settings)?.into_backend())
    }
}

/// How datasets are processed.
#[derive(clap::Args, Debug, Clone)]
pub struct ProcessArgs {
    /// Directory in which per-dataset working directories are created.
    #[arg(long, default_value = DEFAULT_BASE_DIRECTORY)]
    pub directory: PathBuf,

    /// Maximum cores for the pipeline engine, or 'all'.
    #[arg(long, default_value = "1")]
    pub cores: Cores,

    /// Workflow type (snakemake/script).
    #[arg(long, default_value = "snakemake")]
    pub workflow: WorkflowKind,

    /// Local workflow file to use instead of the project's.
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Do not pull files from storage during setup.
    #[arg(long)]
    pub no_download: bool,

    /// Do not push files to storage during upload.
    #[arg(long)]
    pub no_upload: bool,

    /// Delete the working directory after uploading.
    #[arg(long)]
    pub cleanup: bool,
}

impl ProcessArgs {
    fn run_config(&self, dataset: &str) -> RunConfig {
        let mut config = RunConfig::new(dataset)
            .with_base_directory(&self.directory)
            .with_workflow_kind(self.workflow)
            .with_cores(self.cores)
            .with_download(!self.no_download)
            .with_upload(!self.no_upload)
            .with_cleanup(self.cleanup);
        if let Some(path) = &self.path {
            config = config.with_workflow_path(path);
        }
        config
    }
}

/// Arguments for `crunch-agent run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// The slug for the dataset.
    pub dataset: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub process: ProcessArgs,
}

/// Arguments for `crunch-agent next` and `crunch-agent loop`.
#[derive(Parser, Debug)]
pub struct NextArgs {
    /// Only take datasets from this project.
    #[arg(long)]
    pub project: Option<String>,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub process: ProcessArgs,
}

/// Arguments for `crunch-agent files`.
#[derive(Parser, Debug)]
pub struct FilesArgs {
    /// The slug for the dataset.
    pub dataset: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// Parse CLI arguments without running the command.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse CLI arguments and run the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_dataset_command(args).await,
        Commands::Next(args) => run_next_command(args).await,
        Commands::Loop(args) => run_loop_command(args).await,
        Commands::Files(args) => run_files_command(args).await,
        Commands::Diagnostics => {
            println!("{}", serde_json::to_string_pretty(&Diagnostics::collect())?);
            Ok(())
        }
    }
}

async fn run_dataset_command(args: RunArgs) -> anyhow::Result<()> {
    let coordinator = args.connection.coordinator()?;
    let storage = args.connection.storage()?;
    let result = process_dataset(&args.dataset, &args.process, coordinator, storage).await?;
    fail_on(result, &args.dataset)
}

async fn run_next_command(args: NextArgs) -> anyhow::Result<()> {
    let coordinator = args.connection.coordinator()?;
    let storage = args.connection.storage()?;
    let (dataset, result) =
        process_next(args.project.as_deref(), &args.process, coordinator, storage).await?;
    fail_on(result, &dataset)
}

async fn run_loop_command(args: NextArgs) -> anyhow::Result<()> {
    let coordinator = args.connection.coordinator()?;
    let storage = args.connection.storage()?;
    info!("Looping through datasets until none are left");

    let mut processed = 0usize;
    let mut failed = 0usize;
    loop {
        match process_next(
            args.project.as_deref(),
            &args.process,
            coordinator.clone(),
            storage.clone(),
        )
        .await
        {
            Ok((dataset, result)) => {
                processed += 1;
                if result.is_fail() {
                    failed += 1;
                    warn!("Dataset '{}' finished with {}", dataset, result);
                }
            }
            Err(e) if e.is::<NoDatasets>() => break,
            Err(e) => return Err(e),
        }
    }

    info!("Processed {} datasets ({} failed)", processed, failed);
    Ok(())
}

async fn run_files_command(args: FilesArgs) -> anyhow::Result<()> {
    let coordinator = args.connection.coordinator()?;
    let storage = args.connection.storage()?;
    let dataset = coordinator.dataset(&args.dataset).await?;
    println!("{}", render_listing(&dataset.base_path, storage.as_ref()).await);
    Ok(())
}

/// Claims the next dataset and processes it.
pub async fn process_next(
    project: Option<&str>,
    process: &ProcessArgs,
    coordinator: Arc<dyn Coordinator>,
    storage: Arc<dyn StorageBackend>,
) -> anyhow::Result<(String, RunResult)> {
    let next = match coordinator.next_dataset(project).await? {
        Some(next) => next,
        None => {
            info!("No more datasets to process.");
            return Err(NoDatasets.into());
        }
    };

    info!("Next dataset is '{}' in project '{}'", next.dataset, next.project);
    let result = process_dataset(&next.dataset, process, coordinator, storage).await?;
    Ok((next.dataset, result))
}

/// Runs all stages for one dataset.
pub async fn process_dataset(
    dataset: &str,
    process: &ProcessArgs,
    coordinator: Arc<dyn Coordinator>,
    storage: Arc<dyn StorageBackend>,
) -> anyhow::Result<RunResult> {
    let mut run = Run::new(process.run_config(dataset), coordinator, storage).await?;
    let result = run.execute().await?;
    info!("Dataset '{}' finished with {}", dataset, result);
    Ok(result)
}

fn fail_on(result: RunResult, dataset: &str) -> anyhow::Result<()> {
    if result.is_fail() {
        anyhow::bail!("Processing dataset '{}' failed", dataset);
    }
    Ok(())
}
