//! Wire types for the `/api/generate` endpoint.

use serde::{Deserialize, Serialize};

/// Non-streaming generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Backend (model) identifier, e.g. "llama3:latest".
    pub model: String,
    pub prompt: String,
    /// Always `false`: the client expects one JSON document back.
    pub stream: bool,
}

impl GenerateRequest {
    pub fn new(model: &str, prompt: &str) -> Self {
        Self {
            model: model.to_string(),
            prompt: prompt.to_string(),
            stream: false,
        }
    }
}

/// Successful generation response. Only `response` is required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
}

/// Error document returned with 4xx/5xx statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_stream_false() {
        let req = GenerateRequest::new("mistral:latest", "ping");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "mistral:latest");
        assert_eq!(json["prompt"], "ping");
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn response_deserialize_from_api_format() {
        let api_json = r####"{
            "model": "llama3:latest",
            "created_at": "2025-01-01T00:00:00Z",
            "response": "### code ###\nfoo",
            "done": true,
            "total_duration": 12345
        }"####;
        let resp: GenerateResponse = serde_json::from_str(api_json).unwrap();
        assert_eq!(resp.model.as_deref(), Some("llama3:latest"));
        assert_eq!(resp.response, "### code ###\nfoo");
        assert!(resp.done);
    }

    #[test]
    fn response_without_text_defaults_to_empty() {
        let resp: GenerateResponse = serde_json::from_str(r#"{"done": true}"#).unwrap();
        assert!(resp.response.is_empty());
    }

    #[test]
    fn error_body_parses() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"error": "model 'foo' not found, try pulling it first"}"#)
                .unwrap();
        assert!(body.error.contains("not found"));
    }
}
