//! Classify failures into retry policy error classes.
//!
//! Providers rarely agree on error types, so classification works off the
//! failure's message (case-insensitive substring match) plus the status code
//! when one is available.

use super::failure::Failure;
use super::policy::ErrorClass;

/// Message fragments that mean the caller exceeded its request quota.
const RATE_LIMIT_INDICATORS: &[&str] = &[
    "rate limit",
    "ratelimit",
    "too many requests",
    "429",
    "quota exceeded",
    "throttled",
    "requests per minute",
];

/// Message fragments that mean a temporary network or service failure.
const TRANSIENT_INDICATORS: &[&str] = &[
    "timeout",
    "connection",
    "service unavailable",
    "503",
    "502",
    "500",
    "internal server error",
    "temporary",
];

const TOO_MANY_REQUESTS: u16 = 429;

fn message_matches(message: &str, indicators: &[&str]) -> bool {
    indicators.iter().any(|needle| message.contains(needle))
}

fn is_rate_limit_message(code: Option<u16>, message: &str) -> bool {
    code == Some(TOO_MANY_REQUESTS) || message_matches(message, RATE_LIMIT_INDICATORS)
}

/// True if the failure signals rate limiting (status 429 or a rate-limit message).
pub fn classify_rate_limit<F: Failure + ?Sized>(failure: &F) -> bool {
    let message = failure.to_string().to_lowercase();
    is_rate_limit_message(failure.status_code(), &message)
}

/// True if the failure is worth retrying: rate limits and transient
/// network/service errors.
pub fn classify_retryable<F: Failure + ?Sized>(failure: &F) -> bool {
    classify(failure).is_retryable()
}

/// Classify a failure into an [`ErrorClass`].
pub fn classify<F: Failure + ?Sized>(failure: &F) -> ErrorClass {
    let message = failure.to_string().to_lowercase();
    if is_rate_limit_message(failure.status_code(), &message) {
        ErrorClass::RateLimited
    } else if message_matches(&message, TRANSIENT_INDICATORS) {
        ErrorClass::Transient
    } else {
        ErrorClass::NonRetryable
    }
}
