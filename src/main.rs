use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "kanban")]
#[command(version, about = "Pipeline engine for agent-driven kanban stages")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Repository root (defaults to the current directory)
    #[arg(long, global = true)]
    pub repo: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create .kanban/ with a default config, pipeline and skill stubs
    Init {
        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },
    /// Validate the pipeline definition
    Validate {
        /// Pipeline file (defaults to the configured path)
        #[arg(long)]
        pipeline: Option<PathBuf>,
        /// Invoke each resolver with synthetic data
        #[arg(long)]
        dry_run: bool,
    },
    /// Acquire, release or inspect a stage's session lock
    Lock {
        #[command(subcommand)]
        command: LockCommands,
    },
    /// Set a stage's status and propagate it to its ticket and epic
    Transition {
        stage_id: String,
        status: String,
        /// Allow transitions the pipeline does not declare
        #[arg(long)]
        force: bool,
    },
    /// Poll code review state for stages awaiting review
    Poll {
        /// Keep polling on the configured interval until Ctrl-C
        #[arg(long)]
        watch: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum LockCommands {
    /// Mark the stage as having an active session
    Acquire { stage_id: String },
    /// Clear the stage's active session flag
    Release { stage_id: String },
    /// Show whether the stage is locked and its status
    Status { stage_id: String },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    kanban_engine::logging::init(cli.verbose, cli.log_json);

    let repo_root = match cli.repo.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Init { force } => cmd::cmd_init(&repo_root, *force)?,
        Commands::Validate { pipeline, dry_run } => {
            cmd::cmd_validate(&repo_root, &cli, pipeline.as_deref(), *dry_run).await?
        }
        Commands::Lock { command } => cmd::cmd_lock(&repo_root, &cli, command.clone()).await?,
        Commands::Transition {
            stage_id,
            status,
            force,
        } => cmd::cmd_transition(&repo_root, &cli, stage_id, status, *force).await?,
        Commands::Poll { watch } => cmd::cmd_poll(&repo_root, &cli, *watch).await?,
        Commands::Config { command } => cmd::cmd_config(&repo_root, command.clone())?,
    }

    Ok(())
}
