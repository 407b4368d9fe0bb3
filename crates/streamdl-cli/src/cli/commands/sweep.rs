//! `streamdl sweep` – reconcile the ledger with the disk.

use anyhow::Result;
use std::sync::Arc;
use streamdl_core::config::{StoragePaths, StreamdlConfig};
use streamdl_core::ledger::Ledger;
use streamdl_core::paths::PathManager;

pub async fn run_sweep(cfg: &StreamdlConfig, storage: &StoragePaths) -> Result<()> {
    let ledger = Ledger::open_at(&storage.ledger_path).await?;
    let missing = ledger.sweep_missing().await;
    ledger.close().await;

    let paths = Arc::new(PathManager::from_storage(storage));
    let retention = cfg.temp_retention();
    let removed = tokio::task::spawn_blocking(move || paths.sweep_orphans(retention)).await?;

    println!("{} completed job(s) marked missing_file", missing);
    println!(
        "{} temp file(s) older than {} day(s) removed",
        removed, cfg.temp_retention_days
    );
    Ok(())
}
