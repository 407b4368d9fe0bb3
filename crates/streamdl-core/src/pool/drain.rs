//! Orderly shutdown: wait for admitted jobs (bounded), then release resources.

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::oneshot;

use super::scheduler::{Command, Leftover};
use super::{PoolState, WorkerPool};

/// Totals printed when the pool shuts down.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub succeeded: usize,
    pub failed: usize,
    pub errored: usize,
    /// Submissions rejected at admission.
    pub skipped: usize,
    /// Admitted but never started before the wait bound expired.
    pub still_queued: usize,
    /// Still running when the wait bound expired; temp files kept.
    pub abandoned: usize,
    pub timed_out: bool,
    pub orphans_removed: usize,
}

impl fmt::Display for DrainReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "succeeded: {}, failed: {}, errored: {}, skipped: {}, still queued: {}",
            self.succeeded, self.failed, self.errored, self.skipped, self.still_queued
        )?;
        if self.timed_out {
            write!(f, ", abandoned: {} (drain timed out)", self.abandoned)?;
        }
        Ok(())
    }
}

impl WorkerPool {
    /// Stop intake, wait up to the drain timeout for every admitted job, then
    /// evict old temp files and close the ledger.
    ///
    /// Jobs still running when the bound expires are abandoned in place.
    pub async fn drain(self) -> DrainReport {
        self.close_intake();
        let options = &self.shared.options;

        let active = self.active_count();
        let timed_out = if active == 0 {
            false
        } else {
            tracing::info!(
                active,
                timeout_secs = options.drain_timeout.as_secs(),
                "draining, waiting for active jobs"
            );
            let mut rx = self.active_rx.clone();
            let finished = tokio::time::timeout(options.drain_timeout, rx.wait_for(|n| *n == 0))
                .await
                .is_ok();
            if !finished {
                tracing::warn!(
                    remaining = *rx.borrow(),
                    "drain timed out, abandoning remaining jobs"
                );
            }
            !finished
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let leftover = if self.commands.send(Command::Shutdown(reply_tx)).is_ok() {
            reply_rx.await.unwrap_or_default()
        } else {
            Leftover::default()
        };
        if let Err(e) = self.scheduler.await {
            tracing::error!("scheduler task join: {}", e);
        }

        let paths = Arc::clone(&self.shared.paths);
        let retention = options.temp_retention;
        let orphans_removed = tokio::task::spawn_blocking(move || paths.sweep_orphans(retention))
            .await
            .unwrap_or(0);

        self.shared.ledger.close().await;
        self.shared.state.send_replace(PoolState::Stopped);

        let tally = &self.shared.tally;
        let report = DrainReport {
            succeeded: tally.succeeded.load(Ordering::Relaxed),
            failed: tally.failed.load(Ordering::Relaxed),
            errored: tally.errored.load(Ordering::Relaxed),
            skipped: tally.skipped.load(Ordering::Relaxed),
            still_queued: leftover.still_queued,
            abandoned: leftover.abandoned,
            timed_out,
            orphans_removed,
        };
        tracing::info!(%report, orphans_removed, "worker pool stopped");
        report
    }
}
