//! Retry and backoff policy for failed fetches.
//!
//! Fetch failures are reported as typed outcomes; whether a worker re-invokes
//! the executor is decided here, separately from the failure handling itself.

use std::time::Duration;

use crate::executor::FetchOutcome;

/// Classification of a failed fetch for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The wall-clock bound expired.
    Timeout,
    /// The tool exited non-zero or produced an empty artifact.
    Failed,
    /// The tool could not be started at all (missing binary, permissions).
    Spawn,
}

impl ErrorKind {
    /// Kind for a non-successful outcome; `None` for success.
    pub fn of(outcome: &FetchOutcome) -> Option<Self> {
        match outcome {
            FetchOutcome::Success => None,
            FetchOutcome::Timeout => Some(ErrorKind::Timeout),
            FetchOutcome::Failed(f) if f.is_spawn() => Some(ErrorKind::Spawn),
            FetchOutcome::Failed(_) => Some(ErrorKind::Failed),
        }
    }
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this failure.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Exponential backoff policy with caps.
///
/// The default allows a single attempt, so failures are recorded and left for
/// a later submission unless the config asks for more.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Base delay for backoff.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Decide whether to retry after `attempt` (1-based) failed with `kind`.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }

        match kind {
            ErrorKind::Spawn => RetryDecision::NoRetry,
            ErrorKind::Timeout | ErrorKind::Failed => {
                // base * 2^(attempt-1), capped.
                let exp = 1u32 << attempt.saturating_sub(1).min(8);
                let delay = self.base_delay.saturating_mul(exp).min(self.max_delay);
                RetryDecision::RetryAfter(delay)
            }
        }
    }
}
