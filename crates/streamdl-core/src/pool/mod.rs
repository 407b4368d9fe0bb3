//! Bounded worker pool: runs admitted jobs through the fetch executor, keeps
//! the ledger and exclusion lists current, and drains on shutdown.
//!
//! A single scheduling task owns the queue and the running set. Producers
//! talk to it over a channel; workers report back through their task
//! results, which the scheduler reconciles one at a time. The active count
//! (queued + running) is published on a watch channel so `drain` can wait for
//! zero with a bound.

mod drain;
mod scheduler;
mod worker;

pub use drain::DrainReport;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::StreamdlConfig;
use crate::dedup::{Admission, Deduplicator, ExclusionSet, Rejection};
use crate::executor::FetchExecutor;
use crate::ledger::{Ledger, LedgerStats};
use crate::paths::PathManager;
use crate::retry::RetryPolicy;

use scheduler::Command;

/// Pool tuning, usually taken from `StreamdlConfig`.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Fetches running at once.
    pub capacity: usize,
    pub fetch_threads: u32,
    pub user_agent: String,
    pub fetch_timeout: Duration,
    pub drain_timeout: Duration,
    pub temp_retention: Duration,
    pub monitor_interval: Duration,
    pub retry: RetryPolicy,
}

impl PoolOptions {
    pub fn from_config(cfg: &StreamdlConfig) -> Self {
        Self {
            capacity: cfg.max_concurrent_fetches.max(1),
            fetch_threads: cfg.fetch_threads,
            user_agent: cfg.user_agent.clone(),
            fetch_timeout: cfg.fetch_timeout(),
            drain_timeout: cfg.drain_timeout(),
            temp_retention: cfg.temp_retention(),
            monitor_interval: cfg.monitor_interval(),
            retry: cfg.retry_policy(),
        }
    }
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self::from_config(&StreamdlConfig::default())
    }
}

/// `Running -> Draining -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Running,
    Draining,
    Stopped,
}

impl std::fmt::Display for PoolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PoolState::Running => "running",
            PoolState::Draining => "draining",
            PoolState::Stopped => "stopped",
        })
    }
}

/// Snapshot for monitoring.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolStatus {
    pub state: PoolState,
    /// Jobs admitted and not yet finished (queued + running).
    pub active: usize,
    pub queued: usize,
    pub temp_files: usize,
    pub ledger: LedgerStats,
}

/// One URL or a list of alternative URLs for the same title.
///
/// Deserializes from either a JSON string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceUrls {
    One(String),
    Many(Vec<String>),
}

impl SourceUrls {
    /// Trimmed, non-empty URLs in first-seen order without repeats.
    pub fn into_unique(self) -> Vec<String> {
        let all = match self {
            SourceUrls::One(u) => vec![u],
            SourceUrls::Many(v) => v,
        };
        let mut out: Vec<String> = Vec::with_capacity(all.len());
        for url in all {
            let url = url.trim();
            if !url.is_empty() && !out.iter().any(|u| u == url) {
                out.push(url.to_string());
            }
        }
        out
    }
}

impl From<&str> for SourceUrls {
    fn from(url: &str) -> Self {
        SourceUrls::One(url.to_string())
    }
}

impl From<String> for SourceUrls {
    fn from(url: String) -> Self {
        SourceUrls::One(url)
    }
}

impl From<Vec<String>> for SourceUrls {
    fn from(urls: Vec<String>) -> Self {
        SourceUrls::Many(urls)
    }
}

impl From<Vec<&str>> for SourceUrls {
    fn from(urls: Vec<&str>) -> Self {
        SourceUrls::Many(urls.into_iter().map(str::to_string).collect())
    }
}

/// Per-URL result of `submit_job`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Queued {
        source_url: String,
        source_key: String,
    },
    Rejected {
        source_url: String,
        reason: Rejection,
    },
}

impl SubmitOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, SubmitOutcome::Queued { .. })
    }
}

#[derive(Debug, Default)]
pub(crate) struct Tally {
    pub succeeded: AtomicUsize,
    pub failed: AtomicUsize,
    pub errored: AtomicUsize,
    pub skipped: AtomicUsize,
}

impl Tally {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// State shared by the pool handle, the scheduler and the workers.
pub(crate) struct Shared {
    pub ledger: Ledger,
    pub dedup: Deduplicator,
    pub paths: Arc<PathManager>,
    pub executor: Arc<dyn FetchExecutor>,
    pub options: PoolOptions,
    pub state: watch::Sender<PoolState>,
    /// Queued + running jobs.
    pub active: watch::Sender<usize>,
    pub queued: AtomicUsize,
    pub tally: Tally,
}

impl Shared {
    /// One job left the pool: wake any drain waiter.
    pub fn job_done(&self) {
        self.active.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Handle to a running pool. Dropping it without `drain` aborts running fetches.
pub struct WorkerPool {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
    scheduler: JoinHandle<()>,
    active_rx: watch::Receiver<usize>,
}

impl WorkerPool {
    /// Start the scheduling task.
    ///
    /// Creates the storage directories and moves records a previous run left
    /// in `downloading` to `error`.
    pub async fn start(
        ledger: Ledger,
        exclusions: ExclusionSet,
        paths: Arc<PathManager>,
        executor: Arc<dyn FetchExecutor>,
        options: PoolOptions,
    ) -> Result<Self> {
        paths.ensure_dirs()?;

        let recovered = ledger.recover_interrupted().await;
        if recovered > 0 {
            tracing::warn!(recovered, "records from an interrupted run moved to error");
        }

        let (state, _) = watch::channel(PoolState::Running);
        let (active, active_rx) = watch::channel(0usize);
        let shared = Arc::new(Shared {
            dedup: Deduplicator::new(ledger.clone(), Arc::clone(&paths), exclusions),
            ledger,
            paths,
            executor,
            options,
            state,
            active,
            queued: AtomicUsize::new(0),
            tally: Tally::default(),
        });

        let (commands, rx) = mpsc::unbounded_channel();
        let scheduler = tokio::spawn(scheduler::run(Arc::clone(&shared), rx));
        tracing::info!(
            capacity = shared.options.capacity,
            executor = shared.executor.name(),
            "worker pool started"
        );

        Ok(Self {
            shared,
            commands,
            scheduler,
            active_rx,
        })
    }

    /// Admit and queue a job. Each distinct URL is checked on its own; a list
    /// is deduplicated first. Never blocks on pool capacity.
    pub async fn submit_job(
        &self,
        urls: impl Into<SourceUrls>,
        title: &str,
        site: &str,
    ) -> Vec<SubmitOutcome> {
        let mut outcomes = Vec::new();
        for url in urls.into().into_unique() {
            outcomes.push(self.submit_one(url, title, site).await);
        }
        outcomes
    }

    async fn submit_one(&self, url: String, title: &str, site: &str) -> SubmitOutcome {
        if self.state() != PoolState::Running {
            Tally::bump(&self.shared.tally.skipped);
            tracing::info!(%title, %url, "submission rejected, pool is draining");
            return SubmitOutcome::Rejected {
                source_url: url,
                reason: Rejection::Draining,
            };
        }

        let job = match self.shared.dedup.admit(&url, title, site).await {
            Admission::Admitted(job) => job,
            Admission::Rejected(reason) => {
                Tally::bump(&self.shared.tally.skipped);
                return SubmitOutcome::Rejected {
                    source_url: url,
                    reason,
                };
            }
        };

        let source_url = job.source_url.clone();
        let source_key = job.source_key.clone();
        self.shared.active.send_modify(|n| *n += 1);
        if let Err(mpsc::error::SendError(Command::Run(job))) =
            self.commands.send(Command::Run(job))
        {
            // Scheduler is gone; undo the admission.
            tracing::error!(%title, "scheduler stopped, job not queued");
            self.shared.dedup.release(&job, false).await;
            self.shared.job_done();
            return SubmitOutcome::Rejected {
                source_url,
                reason: Rejection::Draining,
            };
        }
        SubmitOutcome::Queued {
            source_url,
            source_key,
        }
    }

    /// Stop accepting submissions. Already admitted jobs keep running.
    pub fn close_intake(&self) {
        self.shared.state.send_if_modified(|s| {
            if *s == PoolState::Running {
                *s = PoolState::Draining;
                true
            } else {
                false
            }
        });
    }

    pub fn state(&self) -> PoolState {
        *self.shared.state.borrow()
    }

    /// Jobs admitted and not yet finished.
    pub fn active_count(&self) -> usize {
        *self.active_rx.borrow()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.shared.ledger
    }

    pub fn paths(&self) -> &PathManager {
        &self.shared.paths
    }

    /// Ledger statistics plus live pool counters.
    pub async fn status(&self) -> PoolStatus {
        let paths = Arc::clone(&self.shared.paths);
        let temp_files = tokio::task::spawn_blocking(move || paths.temp_file_count())
            .await
            .unwrap_or(0);
        PoolStatus {
            state: self.state(),
            active: self.active_count(),
            queued: self.shared.queued.load(Ordering::Relaxed),
            temp_files,
            ledger: self.shared.ledger.statistics().await,
        }
    }
}
