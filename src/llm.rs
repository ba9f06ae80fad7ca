use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::OpenRouterConfig;
use crate::error::RelayError;

/// Anything that turns a single prompt into a single reply.
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, RelayError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

/// Pull `error.message` out of an error body, if there is a non-empty one.
fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|e| e.error.message)
        .filter(|m| !m.is_empty())
}

pub struct OpenRouterClient {
    client: reqwest::Client,
    config: OpenRouterConfig,
}

impl OpenRouterClient {
    pub fn new(config: OpenRouterConfig) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RelayError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Completer for OpenRouterClient {
    async fn complete(&self, prompt: &str) -> Result<String, RelayError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage::user(prompt)],
        };

        let url = format!("{}/chat/completions", self.config.base_url);

        debug!("Sending request to OpenRouter: {}", url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", &self.config.referer)
            .header("X-Title", &self.config.title)
            .json(&request)
            .send()
            .await
            .map_err(|e| RelayError::Transport(format!("request to OpenRouter failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RelayError::Transport(format!("failed to read OpenRouter response: {e}")))?;

        if !status.is_success() {
            return Err(match error_message(&body) {
                Some(message) => RelayError::Api(message),
                None => RelayError::Api(format!("status {}: {}", status.as_u16(), body)),
            });
        }

        let chat_response: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| RelayError::Protocol(format!("failed to parse OpenRouter response: {e}")))?;

        match chat_response.choices.into_iter().next() {
            Some(choice) => Ok(choice.message.content.unwrap_or_default()),
            // Some upstreams report failures with a 200 and an error payload.
            None => match chat_response.error {
                Some(err) if !err.message.is_empty() => Err(RelayError::Api(err.message)),
                _ => Err(RelayError::EmptyResponse),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn client_for(base_url: &str) -> OpenRouterClient {
        OpenRouterClient::new(OpenRouterConfig {
            api_key: "test-key".to_string(),
            model: "test/model".to_string(),
            base_url: base_url.to_string(),
            timeout_secs: 5,
            referer: "https://example.com/bot".to_string(),
            title: "Test Bot".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_first_choice_is_returned() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_header("http-referer", "https://example.com/bot")
            .match_header("x-title", "Test Bot")
            .match_body(Matcher::Json(json!({
                "model": "test/model",
                "messages": [{"role": "user", "content": "hello"}]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"content":"hi"}},{"message":{"content":"ignored"}}]}"#)
            .create_async()
            .await;

        let reply = client_for(&server.url()).complete("hello").await.unwrap();
        assert_eq!(reply, "hi");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_no_choices_is_empty_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let err = client_for(&server.url()).complete("hello").await.unwrap_err();
        assert!(matches!(err, RelayError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_error_payload_with_ok_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[],"error":{"message":"upstream overloaded","code":502}}"#)
            .create_async()
            .await;

        let err = client_for(&server.url()).complete("hello").await.unwrap_err();
        assert!(matches!(err, RelayError::Api(ref m) if m == "upstream overloaded"));
    }

    #[tokio::test]
    async fn test_error_status_with_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(r#"{"error":{"message":"No auth credentials found","code":401}}"#)
            .create_async()
            .await;

        let err = client_for(&server.url()).complete("hello").await.unwrap_err();
        assert!(matches!(err, RelayError::Api(ref m) if m == "No auth credentials found"));
    }

    #[tokio::test]
    async fn test_error_status_without_message_includes_raw_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(503)
            .with_body("Service Unavailable")
            .create_async()
            .await;

        let err = client_for(&server.url()).complete("hello").await.unwrap_err();
        assert!(matches!(err, RelayError::Api(ref m) if m == "status 503: Service Unavailable"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_protocol_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body("<html>gateway</html>")
            .create_async()
            .await;

        let err = client_for(&server.url()).complete("hello").await.unwrap_err();
        assert!(matches!(err, RelayError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let err = client_for("http://127.0.0.1:1").complete("hello").await.unwrap_err();
        assert!(err.is_transport());
    }
}
