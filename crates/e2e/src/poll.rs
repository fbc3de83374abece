//! Condition-wait primitives and oracle checks
//!
//! "Eventually true" UI conditions become deterministic pass/fail within a
//! bounded wait. The poller returns a [`WaitOutcome`] rather than raising,
//! so callers can choose to assert or branch.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::error::{HarnessError, HarnessResult};

/// Outcome of a bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Satisfied,
    TimedOut,
}

impl WaitOutcome {
    pub fn is_satisfied(self) -> bool {
        matches!(self, WaitOutcome::Satisfied)
    }

    /// Convert a timeout into a hard failure naming the unmet condition and
    /// the wait bound.
    pub fn require(self, what: &str, timeout: Duration) -> HarnessResult<()> {
        match self {
            WaitOutcome::Satisfied => Ok(()),
            WaitOutcome::TimedOut => Err(HarnessError::Timeout(format!(
                "{} (within {} ms)",
                what,
                timeout.as_millis()
            ))),
        }
    }
}

/// Poll `predicate` at `interval` until it holds or `timeout` elapses.
///
/// The predicate runs at least once even with a zero timeout. Predicate
/// errors propagate immediately; they are not retried.
pub async fn wait_until<F, Fut>(
    timeout: Duration,
    interval: Duration,
    mut predicate: F,
) -> HarnessResult<WaitOutcome>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = HarnessResult<bool>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if predicate().await? {
            return Ok(WaitOutcome::Satisfied);
        }
        if Instant::now() >= deadline {
            return Ok(WaitOutcome::TimedOut);
        }
        sleep(interval).await;
    }
}

/// Fixed settle delay.
///
/// The one allowed exception to the polling rule: used only where the site
/// under test has a known client-side debounce window.
pub async fn settle(ms: u64) {
    sleep(Duration::from_millis(ms)).await;
}

/// Oracle check producing an assertion failure with the given message.
pub fn ensure(cond: bool, msg: impl Into<String>) -> HarnessResult<()> {
    if cond {
        Ok(())
    } else {
        Err(HarnessError::Assertion(msg.into()))
    }
}

/// Substring oracle, case-sensitive.
pub fn ensure_contains(haystack: &str, needle: &str) -> HarnessResult<()> {
    ensure(
        haystack.contains(needle),
        format!("expected {haystack:?} to contain {needle:?}"),
    )
}

/// Substring oracle, case-insensitive.
pub fn ensure_contains_ci(haystack: &str, needle: &str) -> HarnessResult<()> {
    ensure(
        haystack.to_lowercase().contains(&needle.to_lowercase()),
        format!("expected {haystack:?} to contain {needle:?} (ignoring case)"),
    )
}
