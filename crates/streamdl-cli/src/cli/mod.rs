//! CLI for the streamdl fetch job manager.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use streamdl_core::config;
use streamdl_core::ledger::JobStatus;

use commands::{run_input, run_reset, run_status, run_submit, run_sweep};

/// Top-level CLI for the streamdl fetch job manager.
#[derive(Debug, Parser)]
#[command(name = "streamdl")]
#[command(about = "streamdl: deduplicating job manager for external stream fetches", long_about = None)]
pub struct Cli {
    /// Read configuration from PATH instead of ~/.config/streamdl/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Submit one job, run it and drain.
    Submit {
        /// Source URL(s). Several URLs are alternatives for the same title.
        #[arg(required = true)]
        urls: Vec<String>,
        /// Human title; becomes the artifact file name.
        #[arg(long)]
        title: String,
        /// Site label; artifacts land under <videos_dir>/<site>/.
        #[arg(long, default_value = "unknown")]
        site: String,
    },

    /// Read JSON-line jobs from a file (or stdin), run them and drain.
    Run {
        /// JSON-lines file; `{"url": .., "title": .., "site": ..}` per line. Stdin when omitted.
        #[arg(long, value_name = "FILE")]
        input: Option<PathBuf>,
    },

    /// Show ledger statistics and recent jobs.
    Status {
        /// Number of recent jobs to list.
        #[arg(long, default_value = "20", value_name = "N")]
        recent: i64,
        /// Skip this many of the most recent jobs.
        #[arg(long, default_value = "0", value_name = "K")]
        offset: i64,
        /// Only list jobs in this state (pending, downloading, completed, failed, error, missing_file).
        #[arg(long, value_name = "STATE")]
        state: Option<JobStatus>,
    },

    /// Mark completed jobs whose artifact is gone and evict old temp files.
    Sweep,

    /// Delete every ledger record. Exclusion lists and files are kept.
    Reset {
        /// Confirm the reset.
        #[arg(long)]
        yes: bool,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = match &cli.config {
            Some(path) => config::load_from_path(path)?,
            None => config::load_or_init()?,
        };
        tracing::debug!("loaded config: {:?}", cfg);
        let storage = cfg.resolve_paths()?;

        match cli.command {
            CliCommand::Submit { urls, title, site } => {
                run_submit(&cfg, &storage, urls, &title, &site).await?
            }
            CliCommand::Run { input } => run_input(&cfg, &storage, input.as_deref()).await?,
            CliCommand::Status {
                recent,
                offset,
                state,
            } => run_status(&storage, recent, offset, state).await?,
            CliCommand::Sweep => run_sweep(&cfg, &storage).await?,
            CliCommand::Reset { yes } => run_reset(&storage, yes).await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
