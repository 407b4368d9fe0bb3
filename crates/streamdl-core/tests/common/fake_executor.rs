//! Scripted stand-in for the external fetch tool.
//!
//! Behavior is chosen per URL by substring match, falling back to a default.
//! Records every request and the peak number of concurrent fetches.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use streamdl_core::executor::{
    ExecutorCapabilities, FetchExecutor, FetchFailure, FetchOutcome, FetchRequest,
};

#[derive(Debug, Clone)]
pub enum Behavior {
    /// Write these bytes to the destination and exit cleanly.
    Succeed(Vec<u8>),
    /// Write a partial file, then exit non-zero.
    FailPartial(Vec<u8>),
    /// Exit non-zero after writing nothing.
    Empty,
    /// Claim success but leave an empty destination.
    HollowSuccess,
    /// Report a timeout after writing a partial file.
    Timeout,
    /// Fail this many times, then succeed.
    Flaky { failures: usize },
    Panic,
    /// Sleep far beyond any test bound.
    Hang,
}

pub struct FakeExecutor {
    default: Behavior,
    rules: Vec<(String, Behavior)>,
    delay: Duration,
    resume: bool,
    calls: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
    per_url: Mutex<HashMap<String, usize>>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl FakeExecutor {
    pub fn new(default: Behavior) -> Self {
        Self {
            default,
            rules: Vec::new(),
            delay: Duration::ZERO,
            resume: false,
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            per_url: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(Behavior::Succeed(b"video-bytes".to_vec()))
    }

    /// URLs containing `pattern` get `behavior`.
    pub fn with_rule(mut self, pattern: &str, behavior: Behavior) -> Self {
        self.rules.push((pattern.to_string(), behavior));
        self
    }

    /// Time each fetch spends "transferring".
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_resume(mut self) -> Self {
        self.resume = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn behavior_for(&self, url: &str) -> Behavior {
        self.rules
            .iter()
            .find(|(pattern, _)| url.contains(pattern.as_str()))
            .map(|(_, b)| b.clone())
            .unwrap_or_else(|| self.default.clone())
    }
}

struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl FetchExecutor for FakeExecutor {
    async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let attempt = {
            let mut per_url = self.per_url.lock().unwrap();
            let n = per_url.entry(request.source_url.clone()).or_insert(0);
            *n += 1;
            *n
        };

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        let _guard = RunningGuard(&self.running);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let dest = &request.dest;
        match self.behavior_for(&request.source_url) {
            Behavior::Succeed(body) => {
                tokio::fs::write(dest, body).await.unwrap();
                FetchOutcome::Success
            }
            Behavior::FailPartial(partial) => {
                tokio::fs::write(dest, partial).await.unwrap();
                FetchOutcome::Failed(FetchFailure::NonZeroExit {
                    code: Some(1),
                    stderr: "connection reset".into(),
                })
            }
            Behavior::Empty => {
                tokio::fs::write(dest, b"").await.unwrap();
                FetchOutcome::Failed(FetchFailure::EmptyOutput)
            }
            Behavior::HollowSuccess => {
                tokio::fs::write(dest, b"").await.unwrap();
                FetchOutcome::Success
            }
            Behavior::Timeout => {
                tokio::fs::write(dest, b"part").await.unwrap();
                FetchOutcome::Timeout
            }
            Behavior::Flaky { failures } if attempt <= failures => {
                FetchOutcome::Failed(FetchFailure::NonZeroExit {
                    code: Some(1),
                    stderr: format!("flaky attempt {attempt}"),
                })
            }
            Behavior::Flaky { .. } => {
                tokio::fs::write(dest, b"eventually").await.unwrap();
                FetchOutcome::Success
            }
            Behavior::Panic => panic!("fake executor exploded"),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(600)).await;
                FetchOutcome::Timeout
            }
        }
    }

    fn capabilities(&self) -> ExecutorCapabilities {
        ExecutorCapabilities {
            resume: self.resume,
        }
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}
