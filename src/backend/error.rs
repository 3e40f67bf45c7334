//! Error type for the generation backend client.
//!
//! Every [`BackendError`] falls in exactly one retry class, reported by
//! [`BackendError::is_retryable`]: transient failures are retried against the
//! same backend, everything else moves on to the next candidate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    /// The per-attempt timeout elapsed.
    #[error("request timed out")]
    Timeout,

    /// DNS failure, refused connection and the like.
    #[error("connection failed: {0}")]
    Connect(String),

    /// HTTP 429.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// HTTP 5xx.
    #[error("server error (status {status}): {message}")]
    Server { status: u16, message: String },

    /// The backend does not know this model. Never retried on the same backend.
    #[error("backend '{backend}' unavailable: {message}")]
    Unavailable { backend: String, message: String },

    /// Any other 4xx. Repeating the same request cannot succeed.
    #[error("request rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("network error: {0}")]
    Transport(reqwest::Error),

    #[error("failed to parse backend response: {0}")]
    Parse(String),
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Timeout
            | BackendError::Connect(_)
            | BackendError::RateLimited { .. }
            | BackendError::Server { .. }
            | BackendError::Transport(_)
            | BackendError::Parse(_) => true,
            BackendError::Unavailable { .. } | BackendError::Rejected { .. } => false,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout
        } else if err.is_connect() {
            BackendError::Connect(err.to_string())
        } else if err.is_decode() {
            BackendError::Parse(err.to_string())
        } else {
            BackendError::Transport(err)
        }
    }
}
