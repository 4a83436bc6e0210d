//! Retry and backoff policy.
//!
//! This module encapsulates failure classification (rate limits, transient
//! network/service errors) and exponential backoff so that any caller of a
//! flaky external service can share one consistent policy.

mod abort;
mod classify;
mod events;
mod failure;
mod policy;
mod run;

pub use abort::{AbortToken, RetryError};
pub use classify::{classify, classify_rate_limit, classify_retryable};
pub use events::{BackoffEvent, GiveUpEvent, RateLimitEvent, RetryLogger, TracingLogger};
pub use failure::{ApiError, Failure};
pub use policy::{backoff_delay, ErrorClass, RetryDecision};
pub use run::{retry_llm_call, RetryPolicy};
