//! Text-completion protocol types and the OpenAI-compatible HTTP backend.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument};

use noteforge_shared::{CompletionSettings, NoteforgeError, Result};

/// User-Agent string for completion requests.
const USER_AGENT: &str = concat!("noteforge/", env!("CARGO_PKG_VERSION"));

/// Longest error body kept in [`CompletionError::HttpStatus`].
const MAX_ERROR_BODY: usize = 200;

// ---------------------------------------------------------------------------
// Request / error
// ---------------------------------------------------------------------------

/// One text-generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Why a single completion attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    /// The service answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The attempt exceeded its wall-clock budget.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The response carried no usable completion text.
    #[error("empty completion body")]
    EmptyBody,

    /// The response was not the expected JSON shape.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Connection-level failure (DNS, TLS, reset, ...).
    #[error("transport error: {0}")]
    Transport(String),
}

/// A text-completion provider.
pub trait CompletionBackend: Send + Sync {
    /// Run one attempt. Retrying is the caller's concern.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = std::result::Result<String, CompletionError>> + Send;
}

// ---------------------------------------------------------------------------
// HTTP backend
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

/// `POST {base_url}/chat/completions` backend (OpenRouter, OpenAI, vLLM, ...).
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl HttpBackend {
    /// Create a backend from runtime completion settings.
    pub fn new(settings: &CompletionSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.timeout)
            .build()
            .map_err(|e| NoteforgeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            timeout: settings.timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl CompletionBackend for HttpBackend {
    #[instrument(skip_all, fields(model = %self.model, prompt_len = request.user_prompt.len()))]
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<String, CompletionError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout(self.timeout)
                } else {
                    CompletionError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CompletionError::Transport(format!("body read failed: {e}")))?;

        if !status.is_success() {
            return Err(CompletionError::HttpStatus {
                status: status.as_u16(),
                body: truncate_chars(&text, MAX_ERROR_BODY),
            });
        }

        let payload: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| CompletionError::InvalidPayload(e.to_string()))?;

        let content = extract_content(&payload)?;
        debug!(response_len = content.len(), "completion received");
        Ok(content)
    }
}

/// Pull `choices[0].message.content` out of a chat-completions payload.
fn extract_content(payload: &serde_json::Value) -> std::result::Result<String, CompletionError> {
    let Some(choice) = payload.get("choices").and_then(|c| c.get(0)) else {
        return Err(CompletionError::InvalidPayload(
            "response has no choices".into(),
        ));
    };

    match choice.pointer("/message/content").and_then(|c| c.as_str()) {
        Some(content) if !content.trim().is_empty() => Ok(content.to_string()),
        _ => Err(CompletionError::EmptyBody),
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(base_url: &str) -> CompletionSettings {
        let mut section = noteforge_shared::CompletionSection::default();
        section.base_url = base_url.to_string();
        section.model = "test/model".into();
        section.timeout_secs = 5;
        CompletionSettings::from_section(&section, "sk-test")
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            system_prompt: "be terse".into(),
            user_prompt: "hello".into(),
            max_tokens: 64,
            temperature: 0.2,
        }
    }

    #[tokio::test]
    async fn sends_chat_request_and_reads_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "test/model",
                "max_tokens": 64,
                "messages": [
                    {"role": "system", "content": "be terse"},
                    {"role": "user", "content": "hello"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "hi"}}]
            })))
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&settings(&server.uri())).unwrap();
        let text = backend.complete(&request()).await.unwrap();
        assert_eq!(text, "hi");
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&settings(&server.uri())).unwrap();
        let err = backend.complete(&request()).await.unwrap_err();
        assert_eq!(
            err,
            CompletionError::HttpStatus {
                status: 503,
                body: "overloaded".into()
            }
        );
    }

    #[tokio::test]
    async fn null_or_blank_content_is_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": null}}]
            })))
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&settings(&server.uri())).unwrap();
        let err = backend.complete(&request()).await.unwrap_err();
        assert_eq!(err, CompletionError::EmptyBody);
    }

    #[tokio::test]
    async fn non_json_body_is_invalid_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&settings(&server.uri())).unwrap();
        let err = backend.complete(&request()).await.unwrap_err();
        assert!(matches!(err, CompletionError::InvalidPayload(_)));
    }

    #[test]
    fn extract_content_shapes() {
        let ok = serde_json::json!({"choices": [{"message": {"content": "x"}}]});
        assert_eq!(extract_content(&ok).unwrap(), "x");

        let numeric = serde_json::json!({"choices": [{"message": {"content": 42}}]});
        assert_eq!(extract_content(&numeric).unwrap_err(), CompletionError::EmptyBody);

        let missing = serde_json::json!({"error": "nope"});
        assert!(matches!(
            extract_content(&missing).unwrap_err(),
            CompletionError::InvalidPayload(_)
        ));
    }
}
