//! Minimal OpenAI-compatible chat-completions client used by the bundled
//! browser engine.

pub mod retry;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::engine::EngineConfig;
use retry::{RetryPolicy, classify_send_result, retry_with_backoff};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("no API key configured (set {0})")]
    MissingApiKey(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("provider error ({kind}): {message}")]
    Api { kind: String, message: String },
    #[error("response contained no message content")]
    EmptyResponse,
}

impl LlmError {
    /// Short type name used when the error surfaces in the output pane.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingApiKey(_) => "MissingApiKeyError",
            Self::Http(e) if e.is_timeout() => "TimeoutError",
            Self::Http(_) => "ConnectionError",
            Self::Status { status: 401 | 403, .. } => "AuthenticationError",
            Self::Status { status: 429, .. } => "RateLimitError",
            Self::Status { .. } => "APIStatusError",
            Self::Api { .. } => "APIError",
            Self::EmptyResponse => "EmptyResponseError",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    retry: RetryPolicy,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

impl ChatClient {
    pub fn new(config: &EngineConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::MissingApiKey(config.api_key_env.clone()))?;

        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            http,
            base_url: config.provider_base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            retry: RetryPolicy::default(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send one non-streaming completion request and return the reply text.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": messages,
        });

        let resp = retry_with_backoff(
            &self.retry,
            |_attempt| {
                self.http
                    .post(&url)
                    .bearer_auth(&self.api_key)
                    .json(&body)
                    .send()
            },
            classify_send_result,
            |info| {
                tracing::warn!(
                    attempt = info.attempt,
                    delay_ms = info.delay.as_millis() as u64,
                    reason = info.reason.as_str(),
                    "Retrying chat completion"
                );
            },
        )
        .await?;

        let status = resp.status();
        let payload: Value = if status.is_success() {
            resp.json().await?
        } else {
            let text = resp.text().await.unwrap_or_default();
            match serde_json::from_str::<Value>(&text) {
                Ok(v) if v.get("error").is_some() => v,
                _ => {
                    return Err(LlmError::Status {
                        status: status.as_u16(),
                        body: text,
                    });
                }
            }
        };

        parse_completion(&payload)
    }
}

/// Pull the assistant text out of a chat-completions response body.
pub fn parse_completion(body: &Value) -> Result<String, LlmError> {
    if let Some(err) = body.get("error") {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown API error")
            .to_string();
        let kind = err
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("error")
            .to_string();
        return Err(LlmError::Api { kind, message });
    }

    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(LlmError::EmptyResponse)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_key(key: Option<&str>) -> EngineConfig {
        EngineConfig {
            api_key: key.map(str::to_string),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_parse_completion_text() {
        let body = json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "  {\"action\":\"done\"}  "}}]
        });
        assert_eq!(parse_completion(&body).unwrap(), "{\"action\":\"done\"}");
    }

    #[test]
    fn test_parse_completion_api_error() {
        let body = json!({"error": {"message": "Invalid key", "type": "invalid_request_error"}});
        match parse_completion(&body) {
            Err(LlmError::Api { kind, message }) => {
                assert_eq!(kind, "invalid_request_error");
                assert_eq!(message, "Invalid key");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_parse_completion_empty() {
        let body = json!({"choices": [{"message": {"content": ""}}]});
        assert!(matches!(parse_completion(&body), Err(LlmError::EmptyResponse)));
    }

    #[test]
    fn test_client_requires_api_key() {
        let err = ChatClient::new(&config_with_key(None)).unwrap_err();
        assert_eq!(err.kind(), "MissingApiKeyError");
        assert!(err.to_string().contains("OPENAI_API_KEY"));

        assert!(ChatClient::new(&config_with_key(Some("   "))).is_err());
    }

    #[test]
    fn test_client_trims_base_url() {
        let mut config = config_with_key(Some("sk-test"));
        config.provider_base_url = "http://localhost:1234/v1/".to_string();
        let client = ChatClient::new(&config).unwrap();
        assert_eq!(client.base_url, "http://localhost:1234/v1");
        assert_eq!(client.model(), "gpt-4o");
    }

    #[test]
    fn test_status_error_kinds() {
        let auth = LlmError::Status {
            status: 401,
            body: String::new(),
        };
        assert_eq!(auth.kind(), "AuthenticationError");
        let limited = LlmError::Status {
            status: 429,
            body: String::new(),
        };
        assert_eq!(limited.kind(), "RateLimitError");
    }
}
