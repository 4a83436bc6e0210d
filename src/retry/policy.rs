use std::time::Duration;

use crate::config::RetryConfig;

/// High-level classification of a failure for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Caller exceeded its quota (429, "rate limit", ...). Retryable.
    RateLimited,
    /// Timeout, connection failure or 5xx. Retryable.
    Transient,
    /// Anything else; propagated on first occurrence.
    NonRetryable,
}

impl ErrorClass {
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorClass::NonRetryable)
    }
}

/// Decision returned by the retry policy after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Failure is not retryable; propagate it now.
    NoRetry,
    /// Failure is retryable but the attempt or time budget is spent.
    GiveUp,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Backoff delay after failed attempt `attempt` (1-based):
/// `min(base_delay * 2^(attempt-1), max_delay)`.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    const NANOS_PER_SEC: u128 = 1_000_000_000;

    let max = config.max_delay();
    let raw = 1u128
        .checked_shl(attempt.saturating_sub(1))
        .and_then(|factor| config.base_delay().as_nanos().checked_mul(factor));
    match raw {
        // Below max_delay, so the seconds part fits in u64.
        Some(nanos) if nanos < max.as_nanos() => Duration::new(
            (nanos / NANOS_PER_SEC) as u64,
            (nanos % NANOS_PER_SEC) as u32,
        ),
        _ => max,
    }
}

impl RetryConfig {
    /// Decide what to do after attempt `attempt` (1-based) failed with `class`,
    /// `elapsed` after the first attempt started.
    ///
    /// The returned delay never reaches past the elapsed-time budget.
    pub fn decide(&self, attempt: u32, elapsed: Duration, class: ErrorClass) -> RetryDecision {
        if !class.is_retryable() {
            return RetryDecision::NoRetry;
        }
        if attempt >= self.max_attempts() || elapsed >= self.max_elapsed_time() {
            return RetryDecision::GiveUp;
        }
        let remaining = self.max_elapsed_time() - elapsed;
        RetryDecision::RetryAfter(backoff_delay(self, attempt).min(remaining))
    }
}
