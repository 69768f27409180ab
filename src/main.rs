use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt};

use ratchet::phase::Phase;

mod cmd;

#[derive(Parser)]
#[command(name = "ratchet")]
#[command(version, about = "Autonomous plan, build and review loop around a coding agent")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project directory (defaults to the current directory)
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the loop until the reviewer or planner ends it
    Run {
        /// REVIEW -> BUILD round trips allowed before a forced replan
        #[arg(long)]
        max_retries: Option<u32>,

        /// Turn limit for each agent session
        #[arg(long)]
        max_turns: Option<u32>,

        /// Target document the loop works toward (defaults to PLAN.md)
        #[arg(long)]
        target: Option<PathBuf>,

        /// Run without committing checkpoints
        #[arg(long)]
        dry_run: bool,

        /// Start (or resume) from this phase
        #[arg(long)]
        phase: Option<Phase>,
    },
    /// Show the persisted loop state
    Status,
    /// Show the build changes the reviewer would see
    Diff,
    /// Remove persisted loop state and logs
    Reset {
        #[arg(long)]
        force: bool,
    },
}

/// Install the global subscriber.
///
/// With a log directory, events go to `ratchet.log` there through a
/// non-blocking writer whose guard must outlive the run. Without one they go
/// to stderr at `warn` unless `--verbose` is set.
fn init_tracing(log_dir: Option<&Path>, verbose: bool) -> Option<WorkerGuard> {
    let default = match (verbose, log_dir.is_some()) {
        (true, _) => "ratchet=debug",
        (false, true) => "ratchet=info",
        (false, false) => "ratchet=warn",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, "ratchet.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .init();
            Some(guard)
        }
        None => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Run {
            max_retries,
            max_turns,
            target,
            dry_run,
            phase,
        } => {
            let overrides = ratchet::config::ConfigOverrides {
                max_retries: *max_retries,
                max_turns: *max_turns,
                target_document: target.clone(),
                dry_run: *dry_run,
                start_phase: *phase,
                verbose: cli.verbose,
            };
            let config = ratchet::config::Config::new(project_dir, overrides)?;
            config.ensure_directories()?;
            let _guard = init_tracing(Some(&config.log_dir), cli.verbose);
            config.report_warnings();
            cmd::run_loop(config).await?;
        }
        Commands::Status => {
            let _guard = init_tracing(None, cli.verbose);
            cmd::cmd_status(&project_dir)?;
        }
        Commands::Diff => {
            let _guard = init_tracing(None, cli.verbose);
            cmd::cmd_diff(&project_dir)?;
        }
        Commands::Reset { force } => {
            let _guard = init_tracing(None, cli.verbose);
            cmd::cmd_reset(&project_dir, *force)?;
        }
    }

    Ok(())
}
