//! `streamdl submit` – run a single job to completion.

use anyhow::Result;
use streamdl_core::config::{StoragePaths, StreamdlConfig};

use super::{open_pool, print_outcomes, print_report};

pub async fn run_submit(
    cfg: &StreamdlConfig,
    storage: &StoragePaths,
    urls: Vec<String>,
    title: &str,
    site: &str,
) -> Result<()> {
    let pool = open_pool(cfg, storage).await?;
    let outcomes = pool.submit_job(urls, title, site).await;
    print_outcomes(title, &outcomes);

    let report = pool.drain().await;
    print_report(&report);
    Ok(())
}
