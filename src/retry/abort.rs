//! Cooperative cancellation of a retry loop.
//!
//! A caller hands an [`AbortToken`] to one of the `*_cancellable` loops and
//! keeps a clone; setting it while the loop waits between attempts stops the
//! loop instead of starting another attempt.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest uninterrupted sleep while polling the abort token.
pub(crate) const ABORT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shared abort flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct AbortToken(Arc<AtomicBool>);

impl AbortToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the loop stop at its next wait.
    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Sleep for `delay`; returns false if `token` was set first.
///
/// Without a token this is a plain sleep. With one, the sleep is cut into
/// slices so the token is polled. A delay too large for `Instant` has no
/// deadline and only ends when aborted.
pub(crate) fn sleep_unless_aborted(delay: Duration, token: Option<&AbortToken>) -> bool {
    let Some(token) = token else {
        std::thread::sleep(delay);
        return true;
    };
    let deadline = Instant::now().checked_add(delay);
    loop {
        if token.is_aborted() {
            return false;
        }
        let slice = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return true;
                }
                (deadline - now).min(ABORT_POLL_INTERVAL)
            }
            None => ABORT_POLL_INTERVAL,
        };
        std::thread::sleep(slice);
    }
}

/// Async counterpart of [`sleep_unless_aborted`].
pub(crate) async fn sleep_unless_aborted_async(
    delay: Duration,
    token: Option<&AbortToken>,
) -> bool {
    let Some(token) = token else {
        tokio::time::sleep(delay).await;
        return true;
    };
    let deadline = tokio::time::Instant::now().checked_add(delay);
    loop {
        if token.is_aborted() {
            return false;
        }
        let slice = match deadline {
            Some(deadline) => {
                let now = tokio::time::Instant::now();
                if now >= deadline {
                    return true;
                }
                (deadline - now).min(ABORT_POLL_INTERVAL)
            }
            None => ABORT_POLL_INTERVAL,
        };
        tokio::time::sleep(slice).await;
    }
}

/// Result error of a cancellable retry loop.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The loop ended normally with this failure (non-retryable or gave up).
    Failed(E),
    /// The token was set while waiting; `last` is the failure that caused the wait.
    Aborted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    /// The underlying failure, whichever way the loop ended.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Failed(e) => e,
            RetryError::Aborted { last, .. } => last,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, RetryError::Aborted { .. })
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Failed(e) => write!(f, "{}", e),
            RetryError::Aborted { attempts, last } => {
                write!(f, "retry aborted after {} attempts (last error: {})", attempts, last)
            }
        }
    }
}

impl<E> std::error::Error for RetryError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RetryError::Failed(e) => e.source(),
            RetryError::Aborted { last, .. } => Some(last),
        }
    }
}
