//! `streamdl run` – feed JSON-line jobs into the pool, then drain.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use streamdl_core::config::{StoragePaths, StreamdlConfig};
use streamdl_core::pool::SourceUrls;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use super::{open_pool, print_outcomes, print_report};

/// One line of job input.
#[derive(Debug, Deserialize, PartialEq)]
pub(crate) struct JobLine {
    pub url: SourceUrls,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_site")]
    pub site: String,
}

fn default_title() -> String {
    "Unknown".to_string()
}

fn default_site() -> String {
    "unknown".to_string()
}

/// `None` for blank lines and `#` comments.
pub(crate) fn parse_line(line: &str) -> Option<Result<JobLine>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(serde_json::from_str::<JobLine>(line).context("invalid job line"))
}

pub async fn run_input(
    cfg: &StreamdlConfig,
    storage: &StoragePaths,
    input: Option<&Path>,
) -> Result<()> {
    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("open {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let pool = open_pool(cfg, storage).await?;
    let mut lines = reader.lines();
    let mut line_no = 0usize;
    let mut submitted = 0usize;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = &mut ctrl_c => {
                println!("interrupted; no more jobs are read, draining");
                break;
            }
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("reading job input: {}", e);
                break;
            }
        };
        line_no += 1;

        match parse_line(&line) {
            None => continue,
            Some(Err(e)) => {
                tracing::warn!(line = line_no, "{:#}", e);
                eprintln!("line {}: {:#}", line_no, e);
            }
            Some(Ok(job)) => {
                let outcomes = pool.submit_job(job.url, &job.title, &job.site).await;
                print_outcomes(&job.title, &outcomes);
                submitted += 1;
            }
        }
    }

    tracing::info!(submitted, "input finished, draining");
    let report = pool.drain().await;
    print_report(&report);
    Ok(())
}
