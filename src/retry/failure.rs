//! What the classifier needs from a failure, and a ready-made failure type for
//! HTTP-style LLM clients.

use std::fmt;

/// A failure the retry loop can classify: a human-readable message plus an
/// optional numeric status code.
pub trait Failure: fmt::Display {
    /// HTTP-style status code, when the failure carries one.
    fn status_code(&self) -> Option<u16> {
        None
    }
}

/// Error returned by an LLM API call.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The server answered with a non-2xx status.
    #[error("HTTP {code}: {message}")]
    Status { code: u16, message: String },
    /// Request never got a response (DNS, connect, read timeout, ...).
    /// Displays with a "connection error" prefix, so it always classifies as transient.
    #[error("connection error: {0}")]
    Transport(String),
    #[error("{0}")]
    Other(String),
}

impl Failure for ApiError {
    fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { code, .. } => Some(*code),
            ApiError::Transport(_) | ApiError::Other(_) => None,
        }
    }
}

/// Looks through the error chain for an [`ApiError`] status.
impl Failure for anyhow::Error {
    fn status_code(&self) -> Option<u16> {
        self.chain()
            .find_map(|e| e.downcast_ref::<ApiError>())
            .and_then(|e| e.status_code())
    }
}

impl Failure for std::io::Error {}

impl Failure for String {}

impl<F: Failure + ?Sized> Failure for &F {
    fn status_code(&self) -> Option<u16> {
        (**self).status_code()
    }
}

impl<F: Failure + ?Sized> Failure for Box<F> {
    fn status_code(&self) -> Option<u16> {
        (**self).status_code()
    }
}
