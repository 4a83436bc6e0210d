//! Retry loop events and the logger they are reported to.

use std::fmt;
use std::time::Duration;

/// Sink for retry loop events. Injected into [`RetryPolicy`](super::RetryPolicy)
/// so callers can route them anywhere; [`TracingLogger`] is the default.
///
/// The loop calls the `on_*` hooks with the structured event. Their default
/// bodies log the event's `Display` text through `warn` / `error`.
pub trait RetryLogger: Send + Sync {
    fn warn(&self, message: &str);
    fn error(&self, message: &str);

    fn on_backoff(&self, event: &BackoffEvent) {
        self.warn(&event.to_string());
    }

    fn on_give_up(&self, event: &GiveUpEvent) {
        self.error(&event.to_string());
    }

    fn on_rate_limit(&self, event: &RateLimitEvent) {
        self.warn(&event.to_string());
    }
}

/// Forwards retry messages to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl RetryLogger for TracingLogger {
    fn warn(&self, message: &str) {
        tracing::warn!(target: "llm_retry", "{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "llm_retry", "{}", message);
    }
}

/// A retryable attempt failed and the loop is about to sleep.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffEvent {
    pub wait: Duration,
    /// Attempts made so far (1-based).
    pub attempt: u32,
    pub operation: String,
    pub failure: String,
}

impl BackoffEvent {
    pub fn wait_seconds(&self) -> f64 {
        self.wait.as_secs_f64()
    }
}

impl fmt::Display for BackoffEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "backing off {:.1}s after {} tries calling {} due to {}",
            self.wait_seconds(),
            self.attempt,
            self.operation,
            self.failure
        )
    }
}

/// The retry budget ran out; the last failure is about to propagate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GiveUpEvent {
    pub attempt: u32,
    pub operation: String,
    pub failure: String,
}

impl fmt::Display for GiveUpEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "gave up calling {} after {} tries, last error: {}",
            self.operation, self.attempt, self.failure
        )
    }
}

/// An attempt failed because of rate limiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitEvent {
    pub operation: String,
    pub failure: String,
}

impl fmt::Display for RateLimitEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rate limit encountered in {}: {}", self.operation, self.failure)
    }
}
