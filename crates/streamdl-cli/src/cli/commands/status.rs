//! `streamdl status` – ledger statistics and a job listing.

use anyhow::Result;
use streamdl_core::config::StoragePaths;
use streamdl_core::ledger::{JobRecord, JobStatus, Ledger};
use streamdl_core::paths::PathManager;

pub async fn run_status(
    storage: &StoragePaths,
    recent: i64,
    offset: i64,
    state: Option<JobStatus>,
) -> Result<()> {
    let ledger = Ledger::open_at(&storage.ledger_path).await?;
    let stats = ledger.statistics().await;
    let temp_files = PathManager::from_storage(storage).temp_file_count();

    println!("Total jobs:      {}", stats.total);
    for status in JobStatus::ALL {
        println!("  {:<13} {}", status.as_str(), stats.count(status));
    }
    println!("Valid completed: {}", stats.valid_completed);
    println!("Total size:      {:.1} MiB", stats.total_mib());
    println!("Temp files:      {}", temp_files);

    let jobs = match state {
        Some(status) => ledger.jobs_by_status(status).await,
        None => ledger.recent_jobs(recent.max(0), offset.max(0)).await,
    };
    ledger.close().await;

    println!();
    if jobs.is_empty() {
        println!("No jobs in ledger.");
    } else {
        println!("{:<6} {:<13} {:<10} {:<12} TITLE", "ID", "STATE", "SIZE", "SITE");
        for j in &jobs {
            print_row(j);
        }
    }
    Ok(())
}

fn print_row(j: &JobRecord) {
    let size_str = j
        .size_bytes
        .map(|s| format!("{s}"))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{:<6} {:<13} {:<10} {:<12} {}",
        j.id,
        j.status.as_str(),
        size_str,
        j.site.as_deref().unwrap_or("-"),
        j.title
    );
}
