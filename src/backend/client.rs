use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use super::error::BackendError;
use super::types::{ErrorBody, GenerateRequest, GenerateResponse};

/// Timeout for the `ping` prompt sent by [`health_check`].
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Anything that can turn a prompt into text using a named backend.
#[allow(async_fn_in_trait)]
pub trait TextGenerator {
    async fn generate(&self, backend_id: &str, prompt: &str) -> Result<String, BackendError>;
}

/// HTTP client for an Ollama-style `/api/generate` endpoint.
pub struct GenerationClient {
    client: Client,
    endpoint: String,
}

impl GenerationClient {
    /// `timeout` bounds every single request; retries get a fresh budget.
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .timeout(timeout)
            .build()?;
        Ok(Self { client, endpoint })
    }

    async fn post(
        &self,
        backend_id: &str,
        prompt: &str,
        timeout: Option<Duration>,
    ) -> Result<String, BackendError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&GenerateRequest::new(backend_id, prompt));
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(1000);
            return Err(BackendError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error)
                .ok()
                .filter(|m| !m.is_empty())
                .unwrap_or(body);
            return Err(classify_status(status, backend_id, message));
        }

        let body = response.json::<GenerateResponse>().await?;
        debug!(
            backend = backend_id,
            model = body.model.as_deref().unwrap_or(backend_id),
            done = body.done,
            chars = body.response.len(),
            "generation received"
        );
        if !body.done {
            warn!(backend = backend_id, "backend reported an unfinished generation");
        }
        if body.response.is_empty() {
            warn!(backend = backend_id, "backend answered with an empty response");
        }
        Ok(body.response)
    }

    /// Sends a short `ping` prompt with a tight timeout.
    pub async fn ping(&self, backend_id: &str) -> Result<(), BackendError> {
        self.post(backend_id, "ping", Some(HEALTH_TIMEOUT)).await.map(|_| ())
    }
}

impl TextGenerator for GenerationClient {
    async fn generate(&self, backend_id: &str, prompt: &str) -> Result<String, BackendError> {
        self.post(backend_id, prompt, None).await
    }
}

/// Maps a non-success status to an error, detecting "unknown model" replies.
fn classify_status(status: StatusCode, backend_id: &str, message: String) -> BackendError {
    let code = status.as_u16();
    if matches!(code, 400 | 404) && reports_unknown_model(&message) {
        return BackendError::Unavailable {
            backend: backend_id.to_string(),
            message,
        };
    }
    if status.is_server_error() {
        BackendError::Server {
            status: code,
            message,
        }
    } else {
        BackendError::Rejected {
            status: code,
            message,
        }
    }
}

fn reports_unknown_model(message: &str) -> bool {
    let lower = message.to_lowercase();
    (lower.contains("model") && lower.contains("not found")) || lower.contains("unknown model")
}

/// Pings each backend in order and returns the first that answers.
pub async fn health_check(client: &GenerationClient, backends: &[String]) -> Option<String> {
    for backend in backends {
        info!(backend = %backend, "health check");
        match client.ping(backend).await {
            Ok(()) => {
                info!(backend = %backend, "backend responded");
                return Some(backend.clone());
            }
            Err(e) => warn!(backend = %backend, "health check failed: {e}"),
        }
    }
    None
}
