//! Chat completion backends

use super::types::{CompletionRequest, CompletionResult, TokenUsage};
use super::gemini::GeminiProvider;
use crate::config::{CompletionBackend, CompletionSettings};
use crate::error::{RelayError, Result};
use crate::network::{HttpClient, ProviderRequest};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One request/response cycle against a chat completion backend.
///
/// Implemented by [`OpenAiProvider`] and [`GeminiProvider`] for HTTP
/// endpoints; tests substitute in-memory implementations.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Send one request, no retries
    async fn chat(&self, request: &CompletionRequest) -> Result<CompletionResult>;
}

/// Build the backend selected by `settings.backend`
pub fn chat_provider(
    client: HttpClient,
    settings: &CompletionSettings,
) -> Result<Arc<dyn ChatProvider>> {
    Ok(match settings.backend {
        CompletionBackend::OpenAi => Arc::new(OpenAiProvider::new(client, settings)?),
        CompletionBackend::Gemini => Arc::new(GeminiProvider::new(client, settings)?),
    })
}

/// OpenAI-compatible `/chat/completions` endpoint (remote or local)
pub struct OpenAiProvider {
    client: HttpClient,
    api_url: String,
    api_key: Option<String>,
    timeout: Option<Duration>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
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

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default, alias = "input_tokens")]
    prompt_tokens: u64,
    #[serde(default, alias = "output_tokens")]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Structured { message: String },
    Text(String),
}

impl OpenAiProvider {
    pub fn new(client: HttpClient, settings: &CompletionSettings) -> Result<Self> {
        Ok(Self {
            client,
            api_url: settings.api_url.clone(),
            api_key: settings.api_key.clone(),
            timeout: settings.timeout()?,
        })
    }

    fn build_request(&self, request: &CompletionRequest) -> ProviderRequest {
        let body = serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
        });
        let mut http = ProviderRequest::post(&self.api_url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(ref key) = self.api_key {
            http = http.bearer(key);
        }
        http
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.api_url
    }

    async fn chat(&self, request: &CompletionRequest) -> Result<CompletionResult> {
        let response = self
            .client
            .execute_with_timeout(self.build_request(request), self.timeout)
            .await?;

        if response.status != 200 {
            let detail = match serde_json::from_str::<ErrorBody>(&response.text) {
                Ok(ErrorBody {
                    error: ErrorDetail::Structured { message },
                }) => message,
                Ok(ErrorBody {
                    error: ErrorDetail::Text(text),
                }) => text,
                Err(_) => response.text.chars().take(200).collect(),
            };
            return Err(RelayError::provider(
                response.status,
                format!("HTTP {}: {}", response.status, detail),
            ));
        }

        let body: ChatResponse = response.json()?;
        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RelayError::malformed("response has no choices"))?;
        let usage = body.usage.unwrap_or_default();

        debug!(
            model = %request.model,
            input_tokens = usage.prompt_tokens,
            output_tokens = usage.completion_tokens,
            "completion received"
        );

        Ok(CompletionResult::new(
            choice.message.content.unwrap_or_default(),
            TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> OpenAiProvider {
        let settings = CompletionSettings {
            api_url: format!("{}/v1/chat/completions", server.uri()),
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        OpenAiProvider::new(HttpClient::new().unwrap(), &settings).unwrap()
    }

    #[tokio::test]
    async fn test_chat_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "m",
                "messages": [{"role": "user", "content": "hi"}],
                "temperature": 0.5
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "hello"}}],
                "usage": {"prompt_tokens": 3, "completion_tokens": 7}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = CompletionRequest::prompt("m", "hi").with_temperature(0.5);
        let result = provider_for(&server).chat(&request).await.unwrap();

        assert_eq!(result.content, "hello");
        assert_eq!(result.usage.input_tokens, 3);
        assert_eq!(result.usage.output_tokens, 7);
    }

    #[tokio::test]
    async fn test_chat_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"message": "invalid api key", "type": "auth"}
            })))
            .mount(&server)
            .await;

        let request = CompletionRequest::prompt("m", "hi");
        let err = provider_for(&server).chat(&request).await.unwrap_err();

        assert_eq!(err.status(), Some(401));
        assert!(err.to_string().contains("invalid api key"));
    }

    #[tokio::test]
    async fn test_chat_missing_choices_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "x"})))
            .mount(&server)
            .await;

        let request = CompletionRequest::prompt("m", "hi");
        let err = provider_for(&server).chat(&request).await.unwrap_err();
        assert!(matches!(err, RelayError::Provider { status: None, .. }));
    }

    #[tokio::test]
    async fn test_usage_aliases() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "ok"}}],
                "usage": {"input_tokens": 11, "output_tokens": 2}
            })))
            .mount(&server)
            .await;

        let request = CompletionRequest::prompt("m", "hi");
        let result = provider_for(&server).chat(&request).await.unwrap();
        assert_eq!(result.usage.total(), 13);
    }

    #[test]
    fn test_chat_provider_follows_backend() {
        let openai = chat_provider(HttpClient::new().unwrap(), &CompletionSettings::default());
        assert!(openai.unwrap().name().ends_with("/chat/completions"));

        let mut gemini = CompletionSettings::gemini("gemini-2.0-flash");
        gemini.api_key = Some("g-key".to_string());
        let provider = chat_provider(HttpClient::new().unwrap(), &gemini).unwrap();
        assert_eq!(provider.name(), "gemini");

        let mut bad = CompletionSettings::default();
        bad.timeout = Some(-1.0);
        assert!(matches!(
            chat_provider(HttpClient::new().unwrap(), &bad),
            Err(RelayError::Config(_))
        ));
    }
}
