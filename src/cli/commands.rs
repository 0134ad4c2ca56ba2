//! CLI command definitions for neighbor.
//!
//! `neighbor run` discovers projects on GitHub, clones each one and runs a
//! command inside every clone.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgAction, Parser};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::run_file::RunFile;
use crate::backend::registry::{BINARY, GIT, GITHUB};
use crate::backend::{keys, BackendConfig, BackendRegistry, SearchMethod};
use crate::error::PipelineError;
use crate::execution::ExecutionBackend;
use crate::pipeline::{Pipeline, PipelineConfig, RunReport, DEFAULT_PROJECTS_DIR};

/// Exit code reported when the run is interrupted.
const EXIT_CANCELLED: u8 = 130;

/// Discover projects, clone them, and run a command against each one.
#[derive(Parser)]
#[command(name = "neighbor")]
#[command(about = "Run a command against many GitHub projects")]
#[command(version)]
#[command(
    long_about = "neighbor searches GitHub for projects, clones each match and runs an external command (for example a test suite) inside every clone.\n\nExample usage:\n  neighbor run --query 'language:go stars:>1000' --command 'go test ./...' --num-results 20"
)]
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
    /// Search, clone and run.
    Run(RunArgs),
}

/// Arguments for `neighbor run`.
#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Search query, in GitHub search syntax.
    #[arg(short, long)]
    pub query: Option<String>,

    /// Command to run inside every cloned project.
    #[arg(short, long)]
    pub command: Option<String>,

    /// Search type: project, code, meta or version.
    #[arg(short = 't', long, default_value = "project")]
    pub search_type: SearchMethod,

    /// Entity for meta (topic, label, text_match) or version (commit, issue, pull_request) searches.
    #[arg(short, long)]
    pub entity: Option<String>,

    /// Number of projects to discover.
    #[arg(short = 'n', long, default_value_t = 10)]
    pub num_results: usize,

    /// GitHub access token, used for both search and cloning.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Directory that receives one subdirectory per cloned project. Must not exist yet.
    #[arg(long, default_value = DEFAULT_PROJECTS_DIR)]
    pub projects_directory: PathBuf,

    /// Only clone projects; do not run a command.
    #[arg(long)]
    pub plain_retrieve: bool,

    /// Remove the projects directory when the run finishes.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub clean: bool,

    /// Number of concurrent clones.
    #[arg(long, default_value_t = 5)]
    pub retrieval_workers: usize,

    /// Number of concurrent command runs.
    #[arg(long, default_value_t = 1)]
    pub execution_workers: usize,

    /// Kill the command after this many seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Shallow clone depth.
    #[arg(long)]
    pub depth: Option<u32>,

    /// GitHub API base URL (GitHub Enterprise).
    #[arg(long)]
    pub api_url: Option<String>,

    /// JSON or YAML run file; its values override flags.
    #[arg(short = 'f', long)]
    pub file: Option<PathBuf>,

    /// Output the report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    /// Applies the run file, if any.
    fn resolve(mut self) -> anyhow::Result<Self> {
        if let Some(path) = self.file.clone() {
            RunFile::load(&path)?.apply(&mut self);
        }
        Ok(self)
    }

    fn backend_config(&self) -> BackendConfig {
        let mut config = BackendConfig::new().with_search_method(self.search_type);

        if let Some(token) = &self.access_token {
            config = config.with_token(token.clone());
        }
        if let Some(entity) = &self.entity {
            match self.search_type {
                SearchMethod::Meta => config = config.with_option(keys::META_ENTITY, entity.clone()),
                SearchMethod::Version => {
                    config = config.with_option(keys::VERSION_ENTITY, entity.clone())
                }
                other => warn!(entity = %entity, method = %other, "Ignoring entity for search type"),
            }
        }

        let options = [
            (keys::COMMAND, self.command.clone()),
            (keys::API_URL, self.api_url.clone()),
            (keys::DEPTH, self.depth.map(|d| d.to_string())),
            (keys::TIMEOUT_SECS, self.timeout_secs.map(|t| t.to_string())),
        ];
        for (key, value) in options {
            if let Some(value) = value {
                config = config.with_option(key, value);
            }
        }
        config
    }

    fn pipeline_config(&self, query: String) -> PipelineConfig {
        PipelineConfig::new(query)
            .with_num_desired(self.num_results)
            .with_projects_dir(self.projects_directory.clone())
            .with_retrieval_workers(self.retrieval_workers)
            .with_execution_workers(self.execution_workers)
            .with_clean(self.clean)
    }
}

/// Parse CLI arguments without running any command.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parses CLI arguments and runs the command.
pub async fn run() -> anyhow::Result<ExitCode> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Run(args) => run_command(args).await,
    }
}

async fn run_command(args: RunArgs) -> anyhow::Result<ExitCode> {
    let args = args.resolve()?;
    let query = args
        .query
        .clone()
        .filter(|q| !q.trim().is_empty())
        .context("a search query is required (--query or 'query' in the run file)")?;
    if !args.plain_retrieve && args.command.as_deref().map_or(true, |c| c.trim().is_empty()) {
        anyhow::bail!("a command is required unless --plain-retrieve is set");
    }

    let registry = BackendRegistry::with_builtins();
    let backend_config = args.backend_config();
    let search = registry.build_search(GITHUB, &backend_config)?;
    let retrieval = registry.build_retrieval(GIT, &backend_config)?;
    let execution: Option<Arc<dyn ExecutionBackend>> = if args.plain_retrieve {
        None
    } else {
        Some(registry.build_execution(BINARY, &backend_config)?)
    };

    let pipeline = Pipeline::new(search, retrieval, execution, args.pipeline_config(query))?;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            return;
        }
        info!("Received ctrl-c, stopping after in-flight projects...");
        signal_cancel.cancel();
    });

    match pipeline.run(cancel).await {
        Ok(report) => {
            print_report(&report, args.json)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(PipelineError::Cancelled(report)) => {
            print_report(&report, args.json)?;
            Ok(ExitCode::from(EXIT_CANCELLED))
        }
        Err(e) => Err(e.into()),
    }
}

fn print_report(report: &RunReport, json: bool) -> anyhow::Result<()> {
    if json {
        let output = serde_json::to_string_pretty(report)
            .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
        println!("{}", output);
        return Ok(());
    }

    println!("\n=== neighbor run ({}) ===", report.state);
    for project in &report.projects {
        println!(
            "{:<40} retrieval: {:<10} execution: {}",
            project.name, project.retrieval, project.execution
        );
    }
    println!();
    println!("Desired:     {}", report.desired);
    println!(
        "Discovered:  {}{}",
        report.discovered,
        if report.satisfied { "" } else { " (fewer than desired)" }
    );
    println!("Retrieved:   {}", report.retrieved());
    println!("Executed:    {}", report.executed());
    println!("Failed:      {}", report.failed());
    Ok(())
}
