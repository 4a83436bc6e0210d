//! Retry with exponential backoff for calls to rate-limited or flaky services,
//! LLM APIs in particular.
//!
//! ```no_run
//! use llm_retry::{ApiError, RetryPolicy};
//!
//! let policy = RetryPolicy::llm();
//! let reply: Result<String, ApiError> = policy.execute("complete", || {
//!     Err(ApiError::Status { code: 429, message: "slow down".into() })
//! });
//! ```

pub mod config;
pub mod logging;
pub mod retry;

pub use config::{ConfigError, RetryConfig, RetrySettings};
pub use retry::{
    classify, classify_rate_limit, classify_retryable, retry_llm_call, AbortToken, ApiError,
    BackoffEvent, ErrorClass, Failure, GiveUpEvent, RateLimitEvent, RetryDecision, RetryError,
    RetryLogger, RetryPolicy, TracingLogger,
};
