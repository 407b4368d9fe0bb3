//! The scheduling task: queue, bounded running set, reconciliation, monitor.

use futures::FutureExt;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::dedup::AdmittedJob;
use crate::ledger::JobStatus;

use super::worker::{self, JobOutcome};
use super::{Shared, Tally};

pub(crate) enum Command {
    Run(AdmittedJob),
    /// Stop scheduling; running fetches are left to finish on their own.
    Shutdown(oneshot::Sender<Leftover>),
}

/// Work still owned by the scheduler when it was shut down.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Leftover {
    pub still_queued: usize,
    pub abandoned: usize,
}

pub(crate) async fn run(shared: Arc<Shared>, mut commands: mpsc::UnboundedReceiver<Command>) {
    let capacity = shared.options.capacity.max(1);
    let mut queue: VecDeque<AdmittedJob> = VecDeque::new();
    let mut running: JoinSet<(AdmittedJob, JobOutcome)> = JoinSet::new();

    let mut monitor = tokio::time::interval(shared.options.monitor_interval);
    monitor.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_reported: Option<usize> = None;

    loop {
        while running.len() < capacity {
            let Some(job) = queue.pop_front() else {
                break;
            };
            shared.queued.fetch_sub(1, Ordering::Relaxed);
            let shared = Arc::clone(&shared);
            running.spawn(async move {
                let outcome = AssertUnwindSafe(worker::run_job(&shared, &job))
                    .catch_unwind()
                    .await
                    .unwrap_or(JobOutcome::Panicked);
                (job, outcome)
            });
        }

        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(Command::Run(job)) => {
                    shared.queued.fetch_add(1, Ordering::Relaxed);
                    queue.push_back(job);
                }
                Some(Command::Shutdown(reply)) => {
                    let leftover = Leftover {
                        still_queued: queue.len(),
                        abandoned: running.len(),
                    };
                    for job in &queue {
                        tracing::warn!(title = %job.title, "queued job abandoned at shutdown");
                    }
                    if leftover.abandoned > 0 {
                        tracing::warn!(
                            abandoned = leftover.abandoned,
                            "running fetches abandoned; temp files kept for resume"
                        );
                    }
                    running.detach_all();
                    let _ = reply.send(leftover);
                    break;
                }
                None => {
                    // Pool handle dropped without drain: running fetches are aborted.
                    break;
                }
            },
            Some(joined) = running.join_next(), if !running.is_empty() => match joined {
                Ok((job, outcome)) => reconcile(&shared, job, outcome).await,
                Err(e) => {
                    tracing::error!("worker task join: {}", e);
                    shared.job_done();
                }
            },
            _ = monitor.tick() => {
                let active = *shared.active.borrow();
                if last_reported != Some(active) {
                    last_reported = Some(active);
                    if active > 0 {
                        tracing::info!(
                            active,
                            running = running.len(),
                            queued = queue.len(),
                            "fetches in progress"
                        );
                    }
                }
            }
        }
    }
}

/// Completion bookkeeping for one job, in the scheduler's order.
async fn reconcile(shared: &Shared, job: AdmittedJob, outcome: JobOutcome) {
    let succeeded = matches!(outcome, JobOutcome::Succeeded);
    match outcome {
        JobOutcome::Succeeded => Tally::bump(&shared.tally.succeeded),
        JobOutcome::Failed => Tally::bump(&shared.tally.failed),
        JobOutcome::Errored => Tally::bump(&shared.tally.errored),
        JobOutcome::Panicked => {
            tracing::error!(title = %job.title, "worker panicked, recording error");
            shared
                .ledger
                .set_status(&job.source_key, JobStatus::Error, None, None)
                .await;
            Tally::bump(&shared.tally.errored);
        }
    }
    shared.dedup.release(&job, succeeded).await;
    shared.job_done();
    tracing::debug!(
        title = %job.title,
        remaining = *shared.active.borrow(),
        "job released"
    );
}
