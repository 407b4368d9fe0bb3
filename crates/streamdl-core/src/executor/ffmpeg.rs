//! `ffmpeg` as the fetch tool: remuxes an HLS playlist into one MP4 without re-encoding.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

use super::{ExecutorCapabilities, FetchExecutor, FetchFailure, FetchOutcome, FetchRequest};

/// Bytes of stderr kept for diagnostics.
const STDERR_TAIL: usize = 4096;

/// Runs an external `ffmpeg` binary per fetch.
#[derive(Debug, Clone)]
pub struct FfmpegExecutor {
    binary_path: PathBuf,
}

impl FfmpegExecutor {
    pub fn new(binary_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Locate `ffmpeg` on `PATH`.
    pub fn from_path() -> Option<Self> {
        which::which("ffmpeg").ok().map(Self::new)
    }

    pub fn binary_path(&self) -> &std::path::Path {
        &self.binary_path
    }

    /// Command-line arguments for `request`. `-y` only when overwriting.
    pub fn build_args(request: &FetchRequest) -> Vec<OsString> {
        let opts = &request.options;
        let threads = opts.threads.max(1).to_string();
        let mut args: Vec<OsString> = [
            "-allowed_extensions",
            "ALL",
            "-threads",
            threads.as_str(),
            "-http_seekable",
            "1",
            "-user_agent",
            opts.user_agent.as_str(),
            "-i",
            request.source_url.as_str(),
            "-c",
            "copy",
            "-bsf:a",
            "aac_adtstoasc",
            "-threads",
            threads.as_str(),
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        if opts.overwrite {
            args.push("-y".into());
        }
        args.push(request.dest.clone().into_os_string());
        args
    }
}

#[async_trait]
impl FetchExecutor for FfmpegExecutor {
    async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        let child = Command::new(&self.binary_path)
            .args(Self::build_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(c) => c,
            Err(e) => return FetchOutcome::Failed(FetchFailure::Spawn(e)),
        };

        let output =
            match tokio::time::timeout(request.options.timeout, child.wait_with_output()).await {
                // Dropping the wait future kills the child.
                Err(_elapsed) => return FetchOutcome::Timeout,
                Ok(Err(e)) => return FetchOutcome::Failed(FetchFailure::Spawn(e)),
                Ok(Ok(output)) => output,
            };

        if !output.status.success() {
            return FetchOutcome::Failed(FetchFailure::NonZeroExit {
                code: output.status.code(),
                stderr: stderr_tail(&output.stderr),
            });
        }
        match tokio::fs::metadata(&request.dest).await {
            Ok(m) if m.len() > 0 => FetchOutcome::Success,
            _ => FetchOutcome::Failed(FetchFailure::EmptyOutput),
        }
    }

    fn capabilities(&self) -> ExecutorCapabilities {
        // Without -y ffmpeg refuses an existing output; it never appends to it.
        ExecutorCapabilities { resume: false }
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let mut start = text.len().saturating_sub(STDERR_TAIL);
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}
