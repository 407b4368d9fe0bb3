//! One job execution: fetch into the temp file, then finalize or record the failure.

use std::path::Path;
use std::sync::Arc;

use crate::dedup::AdmittedJob;
use crate::executor::{FetchOptions, FetchOutcome, FetchRequest};
use crate::ledger::JobStatus;
use crate::retry::{ErrorKind, RetryDecision};

use super::Shared;

/// How a job ended, as seen by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobOutcome {
    Succeeded,
    /// Fetch failed; ledger `failed`.
    Failed,
    /// Timeout or finalize error; ledger `error`.
    Errored,
    /// The worker body panicked; the scheduler records `error`.
    Panicked,
}

pub(crate) async fn run_job(shared: &Shared, job: &AdmittedJob) -> JobOutcome {
    let resume_capable = shared.executor.capabilities().resume;
    let mut attempt = 1u32;

    loop {
        let overwrite = match temp_len(&job.temp_path).await {
            Some(len) if resume_capable => {
                tracing::info!(title = %job.title, bytes = len, "continuing partial temp file");
                false
            }
            Some(len) => {
                tracing::info!(
                    title = %job.title,
                    bytes = len,
                    executor = shared.executor.name(),
                    "partial temp file present but executor cannot resume; restarting"
                );
                true
            }
            None => true,
        };

        let request = FetchRequest {
            source_url: job.source_url.clone(),
            dest: job.temp_path.clone(),
            options: FetchOptions {
                threads: shared.options.fetch_threads,
                user_agent: shared.options.user_agent.clone(),
                timeout: shared.options.fetch_timeout,
                overwrite,
            },
        };

        tracing::info!(title = %job.title, attempt, "fetch started");
        let outcome = shared.executor.fetch(&request).await;
        let Some(kind) = ErrorKind::of(&outcome) else {
            return finish_success(shared, job).await;
        };

        match &outcome {
            FetchOutcome::Timeout => tracing::error!(
                title = %job.title,
                timeout_secs = shared.options.fetch_timeout.as_secs(),
                temp = %job.temp_path.display(),
                "fetch timed out, temp file kept"
            ),
            FetchOutcome::Failed(failure) => tracing::error!(
                title = %job.title,
                temp = %job.temp_path.display(),
                "fetch failed, temp file kept: {}",
                failure
            ),
            FetchOutcome::Success => {}
        }

        match shared.options.retry.decide(attempt, kind) {
            RetryDecision::RetryAfter(delay) => {
                tracing::warn!(
                    title = %job.title,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying fetch"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            RetryDecision::NoRetry => {
                let (status, result) = match kind {
                    ErrorKind::Timeout => (JobStatus::Error, JobOutcome::Errored),
                    ErrorKind::Failed | ErrorKind::Spawn => (JobStatus::Failed, JobOutcome::Failed),
                };
                shared
                    .ledger
                    .set_status(&job.source_key, status, None, None)
                    .await;
                return result;
            }
        }
    }
}

async fn finish_success(shared: &Shared, job: &AdmittedJob) -> JobOutcome {
    // Executors are not trusted to check their own output.
    if temp_len(&job.temp_path).await.is_none() {
        tracing::error!(
            title = %job.title,
            executor = shared.executor.name(),
            temp = %job.temp_path.display(),
            "fetch reported success but produced no output"
        );
        shared
            .ledger
            .set_status(&job.source_key, JobStatus::Failed, None, None)
            .await;
        return JobOutcome::Failed;
    }

    let paths = Arc::clone(&shared.paths);
    let temp = job.temp_path.clone();
    let site = job.site.clone();
    let title = job.title.clone();
    let finalized =
        tokio::task::spawn_blocking(move || paths.finalize(&temp, &site, &title)).await;

    let (final_path, size) = match finalized {
        Ok(Ok(done)) => done,
        Ok(Err(e)) => {
            tracing::error!(title = %job.title, "finalize failed: {:#}", e);
            shared
                .ledger
                .set_status(&job.source_key, JobStatus::Error, None, None)
                .await;
            return JobOutcome::Errored;
        }
        Err(e) => {
            tracing::error!(title = %job.title, "finalize task: {}", e);
            shared
                .ledger
                .set_status(&job.source_key, JobStatus::Error, None, None)
                .await;
            return JobOutcome::Errored;
        }
    };

    let size_bytes = i64::try_from(size).unwrap_or(i64::MAX);
    shared
        .ledger
        .set_status(
            &job.source_key,
            JobStatus::Completed,
            Some(&final_path),
            Some(size_bytes),
        )
        .await;
    shared.dedup.record_success(job).await;
    tracing::info!(
        title = %job.title,
        path = %final_path.display(),
        size,
        "fetch completed"
    );
    JobOutcome::Succeeded
}

async fn temp_len(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path)
        .await
        .ok()
        .map(|m| m.len())
        .filter(|&len| len > 0)
}
