//! Fetch executor seam: the external tool that performs one transfer.
//!
//! The pool only cares whether the destination ended up non-empty with a
//! clean exit. Failures are typed values, never panics or errors escaping a
//! worker; retrying is decided elsewhere (`crate::retry`).

mod ffmpeg;

pub use ffmpeg::FfmpegExecutor;

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// Tool-level knobs for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    pub threads: u32,
    pub user_agent: String,
    /// Hard wall-clock bound; the process is killed when it expires.
    pub timeout: Duration,
    /// Replace an existing destination instead of continuing it.
    pub overwrite: bool,
}

/// One transfer: `source_url` into `dest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub source_url: String,
    pub dest: PathBuf,
    pub options: FetchOptions,
}

/// Why a fetch did not produce an artifact.
#[derive(Debug, thiserror::Error)]
pub enum FetchFailure {
    #[error("fetch tool exited with {}: {stderr}", exit_label(.code))]
    NonZeroExit { code: Option<i32>, stderr: String },
    #[error("fetch tool exited cleanly but the output is missing or empty")]
    EmptyOutput,
    #[error("failed to start fetch tool: {0}")]
    Spawn(#[source] std::io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {c}"),
        None => "a signal".to_string(),
    }
}

impl FetchFailure {
    /// The tool never ran; retrying the same invocation cannot help.
    pub fn is_spawn(&self) -> bool {
        matches!(self, FetchFailure::Spawn(_))
    }
}

/// Result of one executor invocation.
#[derive(Debug)]
pub enum FetchOutcome {
    Success,
    Failed(FetchFailure),
    Timeout,
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success)
    }
}

/// What an executor can do beyond a plain fresh transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorCapabilities {
    /// Continues a partial destination file instead of starting over.
    pub resume: bool,
}

/// Performs transfers for the worker pool.
#[async_trait]
pub trait FetchExecutor: Send + Sync {
    /// Run one transfer to completion, failure, or timeout.
    async fn fetch(&self, request: &FetchRequest) -> FetchOutcome;

    fn capabilities(&self) -> ExecutorCapabilities {
        ExecutorCapabilities::default()
    }

    fn name(&self) -> &'static str;
}
