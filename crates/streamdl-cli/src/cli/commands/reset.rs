//! `streamdl reset` – delete every ledger record.

use anyhow::{bail, Result};
use streamdl_core::config::StoragePaths;
use streamdl_core::ledger::Ledger;

pub async fn run_reset(storage: &StoragePaths, yes: bool) -> Result<()> {
    if !yes {
        bail!("reset deletes every job record; pass --yes to confirm");
    }
    let ledger = Ledger::open_at(&storage.ledger_path).await?;
    let removed = ledger.reset_all().await;
    ledger.close().await;
    tracing::warn!(removed, "ledger reset");
    println!("removed {} job record(s)", removed);
    Ok(())
}
