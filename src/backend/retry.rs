//! Candidate-ordered querying with per-backend retries.
//!
//! [`query`] never fails: when every candidate is exhausted it returns a
//! synthetic error text so callers can still file the failure as an artifact.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info, warn};

use super::client::TextGenerator;
use super::error::BackendError;

/// Classification of a single attempt against one backend.
#[derive(Debug)]
pub enum AttemptOutcome {
    Success(String),
    /// Try the same backend again after a backoff.
    RetryableFailure(BackendError),
    /// Give up on this backend, move to the next candidate.
    NonRetryableFailure(BackendError),
}

impl From<Result<String, BackendError>> for AttemptOutcome {
    fn from(result: Result<String, BackendError>) -> Self {
        match result {
            Ok(text) => AttemptOutcome::Success(text),
            Err(e) if e.is_retryable() => AttemptOutcome::RetryableFailure(e),
            Err(e) => AttemptOutcome::NonRetryableFailure(e),
        }
    }
}

/// Attempts per candidate and the exponential backoff between them.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// delay = backoff_base * 2^(attempt - 1)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Backoff before retrying after `error`. A longer `Retry-After` hint wins.
    pub fn delay_after(&self, attempt: u32, error: &BackendError) -> Duration {
        let backoff = self.delay_for_attempt(attempt);
        match error {
            BackendError::RateLimited { retry_after_ms } => {
                backoff.max(Duration::from_millis(*retry_after_ms))
            }
            _ => backoff,
        }
    }
}

/// Text produced by [`query`] and the backend that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    pub text: String,
    pub backend_id: String,
    /// Set when every candidate failed; `text` is then a synthetic error text.
    pub error: Option<String>,
}

impl QueryResult {
    pub fn is_exhausted(&self) -> bool {
        self.error.is_some()
    }
}

/// Tries each candidate in order, up to `policy.max_attempts` times each.
pub async fn query<G: TextGenerator>(
    generator: &G,
    candidates: &[String],
    prompt: &str,
    policy: &RetryPolicy,
) -> QueryResult {
    let mut last_error: Option<String> = None;

    for backend in candidates {
        for attempt in 1..=policy.max_attempts {
            info!(backend = %backend, attempt, "querying backend");
            match AttemptOutcome::from(generator.generate(backend, prompt).await) {
                AttemptOutcome::Success(text) => {
                    return QueryResult {
                        text,
                        backend_id: backend.clone(),
                        error: None,
                    };
                }
                AttemptOutcome::NonRetryableFailure(e) => {
                    warn!(backend = %backend, "skipping backend: {e}");
                    last_error = Some(e.to_string());
                    break;
                }
                AttemptOutcome::RetryableFailure(e) => {
                    last_error = Some(e.to_string());
                    if attempt == policy.max_attempts {
                        warn!(
                            backend = %backend,
                            "attempt {attempt}/{} failed: {e}, giving up on this backend",
                            policy.max_attempts
                        );
                        break;
                    }
                    let delay = policy.delay_after(attempt, &e);
                    warn!(
                        backend = %backend,
                        "attempt {attempt}/{} failed: {e}, retrying in {}ms",
                        policy.max_attempts,
                        delay.as_millis()
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    let last_error = last_error.unwrap_or_else(|| "no candidate backends".to_string());
    error!("all backend calls failed: {last_error}");
    QueryResult {
        text: format!("backend error (all attempts failed): {last_error}"),
        backend_id: candidates.first().cloned().unwrap_or_default(),
        error: Some(last_error),
    }
}
