//! Admission control: decides whether a submitted job names work already
//! done, already running, or excluded.
//!
//! Checks run in order and the first hit rejects:
//! 1. seen earlier in this run;
//! 2. completed in the ledger with the artifact still on disk;
//! 3. title in the title exclusion list;
//! 4. URL excluded, exactly or by structural key (also against keys seen this run);
//! 5. already owned by a worker.
//!
//! The whole check-and-insert runs under one async lock, so two concurrent
//! submissions of the same identity can never both be admitted.

mod exclusion;
mod url_key;

pub use exclusion::{ExclusionList, ExclusionSet};
pub use url_key::{normalize_url, url_key};

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::ledger::{source_key, Ledger};
use crate::paths::PathManager;

/// A job that passed admission and owns its identity until released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmittedJob {
    pub source_key: String,
    /// Normalized source URL.
    pub source_url: String,
    pub title: String,
    pub site: String,
    pub temp_path: PathBuf,
    pub url_key: String,
}

/// Why a submission was not admitted. Rejections are normal control flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    SeenThisRun,
    AlreadyCompleted { final_path: PathBuf },
    TitleExcluded,
    UrlExcluded,
    UrlKeyExcluded { key: String },
    InFlight,
    /// The pool stopped accepting work.
    Draining,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::SeenThisRun => f.write_str("already submitted in this run"),
            Rejection::AlreadyCompleted { final_path } => {
                write!(f, "already completed at {}", final_path.display())
            }
            Rejection::TitleExcluded => f.write_str("title is excluded"),
            Rejection::UrlExcluded => f.write_str("url is excluded"),
            Rejection::UrlKeyExcluded { key } => write!(f, "url key {key} already seen"),
            Rejection::InFlight => f.write_str("already in flight"),
            Rejection::Draining => f.write_str("pool is draining"),
        }
    }
}

#[derive(Debug)]
pub enum Admission {
    Admitted(AdmittedJob),
    Rejected(Rejection),
}

struct AdmissionState {
    /// Source keys admitted this run (cleared again when a job fails).
    seen: HashSet<String>,
    /// Structural key -> source key of jobs admitted this run.
    seen_url_keys: HashMap<String, String>,
    in_flight: HashSet<String>,
    exclusions: ExclusionSet,
}

/// Three-tier admission filter in front of the worker pool.
pub struct Deduplicator {
    ledger: Ledger,
    paths: Arc<PathManager>,
    state: Mutex<AdmissionState>,
}

impl Deduplicator {
    pub fn new(ledger: Ledger, paths: Arc<PathManager>, exclusions: ExclusionSet) -> Self {
        Self {
            ledger,
            paths,
            state: Mutex::new(AdmissionState {
                seen: HashSet::new(),
                seen_url_keys: HashMap::new(),
                in_flight: HashSet::new(),
                exclusions,
            }),
        }
    }

    /// Run the admission checks for one URL and, if it passes, mark it in flight
    /// and create its `downloading` ledger record.
    pub async fn admit(&self, source_url: &str, title: &str, site: &str) -> Admission {
        let source_url = normalize_url(source_url);
        let key = source_key(&source_url);
        let fuzzy = url_key(&source_url);

        let mut state = self.state.lock().await;

        let rejection = if state.seen.contains(&key) {
            Some(Rejection::SeenThisRun)
        } else if let Some(final_path) = self.ledger.lookup_completed(&key).await {
            Some(Rejection::AlreadyCompleted { final_path })
        } else if state.exclusions.contains_title(title) {
            Some(Rejection::TitleExcluded)
        } else if state.exclusions.contains_url(&source_url) {
            Some(Rejection::UrlExcluded)
        } else if state.exclusions.contains_url_key(&fuzzy)
            || state
                .seen_url_keys
                .get(&fuzzy)
                .is_some_and(|owner| *owner != key)
        {
            Some(Rejection::UrlKeyExcluded { key: fuzzy.clone() })
        } else if state.in_flight.contains(&key) {
            Some(Rejection::InFlight)
        } else {
            None
        };

        if let Some(rejection) = rejection {
            tracing::info!(%title, url = %source_url, reason = %rejection, "submission rejected");
            return Admission::Rejected(rejection);
        }

        state.seen.insert(key.clone());
        state.seen_url_keys.insert(fuzzy.clone(), key.clone());
        state.in_flight.insert(key.clone());

        let temp_path = self.resolve_temp_path(&key, title).await;
        if self
            .ledger
            .upsert(&source_url, title, site, &temp_path)
            .await
            .is_none()
        {
            // Ledger faults read as "not yet done": the job still runs.
            tracing::warn!(%title, source_key = %key, "admitted without a ledger record");
        }
        drop(state);

        tracing::info!(%title, source_key = %key, "submission admitted");
        Admission::Admitted(AdmittedJob {
            source_key: key,
            source_url,
            title: title.to_string(),
            site: site.to_string(),
            temp_path,
            url_key: fuzzy,
        })
    }

    /// Temp file recorded by an earlier attempt if it still holds data, else the deterministic one.
    async fn resolve_temp_path(&self, key: &str, title: &str) -> PathBuf {
        if let Some(previous) = self.ledger.temp_path(key).await {
            let has_data = tokio::fs::metadata(&previous)
                .await
                .is_ok_and(|m| m.len() > 0);
            if has_data {
                return previous;
            }
        }
        self.paths.temp_path_for(key, title)
    }

    /// Add a finished job to both exclusion lists.
    pub async fn record_success(&self, job: &AdmittedJob) {
        let mut state = self.state.lock().await;
        if let Err(e) = state.exclusions.record(&job.source_url, &job.title) {
            tracing::error!(title = %job.title, "failed to persist exclusion entry: {:#}", e);
        }
    }

    /// Give up ownership of a job's identity.
    ///
    /// A failed job also forgets it was seen this run, so a later submission
    /// may retry it.
    pub async fn release(&self, job: &AdmittedJob, succeeded: bool) {
        let mut state = self.state.lock().await;
        state.in_flight.remove(&job.source_key);
        if !succeeded {
            state.seen.remove(&job.source_key);
            if state.seen_url_keys.get(&job.url_key) == Some(&job.source_key) {
                state.seen_url_keys.remove(&job.url_key);
            }
        }
    }

    pub async fn in_flight_count(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    pub async fn is_in_flight(&self, source_key: &str) -> bool {
        self.state.lock().await.in_flight.contains(source_key)
    }
}
