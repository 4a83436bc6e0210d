//! Retry loop: run an operation until success, a non-retryable failure, or
//! the budget in [`RetryConfig`] runs out.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::abort::{sleep_unless_aborted, sleep_unless_aborted_async, AbortToken, RetryError};
use super::classify::classify;
use super::events::{BackoffEvent, GiveUpEvent, RateLimitEvent, RetryLogger, TracingLogger};
use super::failure::Failure;
use super::policy::{ErrorClass, RetryDecision};
use crate::config::RetryConfig;

/// Bookkeeping for one wrapped call; dropped when the call resolves.
#[derive(Debug)]
struct AttemptRecord {
    attempt: u32,
    started: Instant,
    last_error: Option<String>,
}

impl AttemptRecord {
    fn start() -> Self {
        Self {
            attempt: 1,
            started: Instant::now(),
            last_error: None,
        }
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// What the loop does after a failed attempt.
enum Step {
    Propagate,
    Wait(Duration),
}

/// Wraps fallible operations with classification, exponential backoff and
/// logging. Cheap to clone; holds no per-call state, so one policy can serve
/// any number of concurrent calls.
#[derive(Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    logger: Arc<dyn RetryLogger>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Policy that reports to `tracing`.
    pub fn new(config: RetryConfig) -> Self {
        Self::with_logger(config, Arc::new(TracingLogger))
    }

    pub fn with_logger(config: RetryConfig, logger: Arc<dyn RetryLogger>) -> Self {
        Self { config, logger }
    }

    /// Policy using [`RetryConfig::llm`].
    pub fn llm() -> Self {
        Self::new(RetryConfig::llm())
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `op` until it succeeds or the policy stops retrying, blocking the
    /// current thread between attempts.
    ///
    /// Non-retryable failures and the last failure after giving up are
    /// returned unchanged.
    pub fn execute<T, E, F>(&self, name: &str, op: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        E: Failure,
    {
        self.run(name, op, None).map_err(RetryError::into_inner)
    }

    /// Like [`execute`](Self::execute), but stops with [`RetryError::Aborted`]
    /// if `token` is set while waiting between attempts.
    pub fn execute_cancellable<T, E, F>(
        &self,
        name: &str,
        op: F,
        token: &AbortToken,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        E: Failure,
    {
        self.run(name, op, Some(token))
    }

    fn run<T, E, F>(
        &self,
        name: &str,
        mut op: F,
        token: Option<&AbortToken>,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        E: Failure,
    {
        let mut record = AttemptRecord::start();
        loop {
            let err = match op() {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            match self.after_failure(name, &mut record, &err) {
                Step::Propagate => return Err(RetryError::Failed(err)),
                Step::Wait(delay) => {
                    if !sleep_unless_aborted(delay, token) {
                        return Err(self.aborted(name, &record, err));
                    }
                    record.attempt += 1;
                }
            }
        }
    }

    /// Async variant of [`execute`](Self::execute); waits with `tokio::time::sleep`.
    pub async fn execute_async<T, E, F, Fut>(&self, name: &str, op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Failure,
    {
        self.run_async(name, op, None)
            .await
            .map_err(RetryError::into_inner)
    }

    /// Async variant of [`execute_cancellable`](Self::execute_cancellable).
    pub async fn execute_async_cancellable<T, E, F, Fut>(
        &self,
        name: &str,
        op: F,
        token: &AbortToken,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Failure,
    {
        self.run_async(name, op, Some(token)).await
    }

    async fn run_async<T, E, F, Fut>(
        &self,
        name: &str,
        mut op: F,
        token: Option<&AbortToken>,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Failure,
    {
        let mut record = AttemptRecord::start();
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            match self.after_failure(name, &mut record, &err) {
                Step::Propagate => return Err(RetryError::Failed(err)),
                Step::Wait(delay) => {
                    if !sleep_unless_aborted_async(delay, token).await {
                        return Err(self.aborted(name, &record, err));
                    }
                    record.attempt += 1;
                }
            }
        }
    }

    /// Attach this policy to `op`, decorator style: every call of the returned
    /// closure is a full retried [`execute`](Self::execute).
    pub fn wrap<T, E, F>(
        &self,
        name: impl Into<String>,
        mut op: F,
    ) -> impl FnMut() -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        E: Failure,
    {
        let policy = self.clone();
        let name = name.into();
        move || policy.execute(&name, &mut op)
    }

    fn after_failure<E: Failure>(&self, name: &str, record: &mut AttemptRecord, err: &E) -> Step {
        let class = classify(err);
        let failure = err.to_string();
        tracing::debug!(
            "{} attempt {} failed after {:?} ({:?}): {}",
            name,
            record.attempt,
            record.elapsed(),
            class,
            failure
        );

        if class == ErrorClass::RateLimited {
            let event = RateLimitEvent {
                operation: name.to_string(),
                failure: failure.clone(),
            };
            self.logger.on_rate_limit(&event);
        }

        let step = match self.config.decide(record.attempt, record.elapsed(), class) {
            RetryDecision::NoRetry => Step::Propagate,
            RetryDecision::GiveUp => {
                let event = GiveUpEvent {
                    attempt: record.attempt,
                    operation: name.to_string(),
                    failure: failure.clone(),
                };
                self.logger.on_give_up(&event);
                Step::Propagate
            }
            RetryDecision::RetryAfter(wait) => {
                let event = BackoffEvent {
                    wait,
                    attempt: record.attempt,
                    operation: name.to_string(),
                    failure: failure.clone(),
                };
                self.logger.on_backoff(&event);
                Step::Wait(wait)
            }
        };
        record.last_error = Some(failure);
        step
    }

    fn aborted<E>(&self, name: &str, record: &AttemptRecord, last: E) -> RetryError<E> {
        tracing::info!(
            "{} retry aborted after {} attempts, last error: {}",
            name,
            record.attempt,
            record.last_error.as_deref().unwrap_or("")
        );
        RetryError::Aborted {
            attempts: record.attempt,
            last,
        }
    }
}

/// Run `op` under the LLM preset ([`RetryConfig::llm`]), logging to `tracing`.
pub fn retry_llm_call<T, E, F>(name: &str, op: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: Failure,
{
    RetryPolicy::llm().execute(name, op)
}
