//! CLI command handlers. Each command is in its own file.

mod reset;
mod run;
mod status;
mod submit;
mod sweep;

pub use reset::run_reset;
pub use run::run_input;
pub use status::run_status;
pub use submit::run_submit;
pub use sweep::run_sweep;

use anyhow::{bail, Result};
use std::sync::Arc;
use streamdl_core::config::{StoragePaths, StreamdlConfig};
use streamdl_core::dedup::{ExclusionList, ExclusionSet};
use streamdl_core::executor::{FetchExecutor, FfmpegExecutor};
use streamdl_core::ledger::Ledger;
use streamdl_core::paths::PathManager;
use streamdl_core::pool::{DrainReport, PoolOptions, SubmitOutcome, WorkerPool};

/// Open the ledger, load exclusion lists and start a pool with the configured executor.
async fn open_pool(cfg: &StreamdlConfig, storage: &StoragePaths) -> Result<WorkerPool> {
    let executor: Arc<dyn FetchExecutor> = match &cfg.executor_binary {
        Some(path) => Arc::new(FfmpegExecutor::new(path)),
        None => match FfmpegExecutor::from_path() {
            Some(exec) => Arc::new(exec),
            None => bail!("ffmpeg not found on PATH; set executor_binary in config.toml"),
        },
    };

    let ledger = Ledger::open_at(&storage.ledger_path).await?;
    let exclusions = ExclusionSet::load(
        ExclusionList::new(&storage.title_exclusions),
        ExclusionList::new(&storage.url_exclusions),
    )?;
    let (titles, urls) = exclusions.counts();
    tracing::info!(titles, urls, "exclusion lists loaded");

    let paths = Arc::new(PathManager::from_storage(storage));
    WorkerPool::start(
        ledger,
        exclusions,
        paths,
        executor,
        PoolOptions::from_config(cfg),
    )
    .await
}

fn print_outcomes(title: &str, outcomes: &[SubmitOutcome]) {
    if outcomes.is_empty() {
        println!("skipped  {}: no URL given", title);
    }
    for outcome in outcomes {
        match outcome {
            SubmitOutcome::Queued { source_url, .. } => {
                println!("queued   {}  {}", title, source_url)
            }
            SubmitOutcome::Rejected { source_url, reason } => {
                println!("skipped  {}  {} ({})", title, source_url, reason)
            }
        }
    }
}

fn print_report(report: &DrainReport) {
    println!("{}", report);
    if report.orphans_removed > 0 {
        println!("removed {} old temp file(s)", report.orphans_removed);
    }
}
