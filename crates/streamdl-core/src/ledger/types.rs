//! Types used by the job ledger.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Row identifier.
pub type JobId = i64;

/// Lifecycle status stored as a string in the `downloads` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobStatus {
    Pending,
    Downloading,
    Completed,
    Failed,
    Error,
    MissingFile,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Downloading,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Error,
        JobStatus::MissingFile,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Downloading => "downloading",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Error => "error",
            JobStatus::MissingFile => "missing_file",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "downloading" => Some(JobStatus::Downloading),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "error" => Some(JobStatus::Error),
            "missing_file" => Some(JobStatus::MissingFile),
            _ => None,
        }
    }

    /// Unknown strings in the table read back as `Error`.
    pub fn from_db(s: &str) -> Self {
        Self::parse(s).unwrap_or(JobStatus::Error)
    }

    /// Forward edges of the lifecycle. `completed` only leaves towards
    /// `missing_file` when its artifact disappears.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Downloading | Failed | Error)
                | (Downloading, Completed | Failed | Error)
                | (Failed | Error | MissingFile, Downloading)
                | (Completed, MissingFile)
        )
    }

    pub fn is_terminal_failure(self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Error)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown job status: {s}"))
    }
}

/// One row of the `downloads` table.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub id: JobId,
    pub source_key: String,
    pub source_url: String,
    pub title: String,
    pub site: Option<String>,
    pub final_path: Option<PathBuf>,
    pub temp_path: Option<PathBuf>,
    pub status: JobStatus,
    /// Unix seconds at which the record reached `completed`.
    pub download_time: Option<i64>,
    pub size_bytes: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Aggregate view over the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub total: i64,
    pub per_status: BTreeMap<JobStatus, i64>,
    /// `completed` rows that carry a final path.
    pub valid_completed: i64,
    /// Sum of `size_bytes` over `completed` rows.
    pub total_bytes: i64,
}

impl LedgerStats {
    pub fn count(&self, status: JobStatus) -> i64 {
        self.per_status.get(&status).copied().unwrap_or(0)
    }

    pub fn total_mib(&self) -> f64 {
        self.total_bytes as f64 / 1_048_576.0
    }
}
