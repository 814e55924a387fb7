//! Google Gemini `generateContent` backend

use super::provider::ChatProvider;
use super::types::{CompletionRequest, CompletionResult, Role, TokenUsage};
use crate::config::CompletionSettings;
use crate::error::{RelayError, Result};
use crate::network::{HttpClient, ProviderRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    /// Set on reasoning parts of thinking models
    #[serde(default, skip_serializing)]
    thought: bool,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            thought: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: u16,
    message: String,
}

/// Gemini models reached at `{api_url}/{model}:generateContent`
pub struct GeminiProvider {
    client: HttpClient,
    base_url: String,
    api_key: String,
    timeout: Option<Duration>,
}

impl GeminiProvider {
    /// Fails with a configuration error when no API key is set
    pub fn new(client: HttpClient, settings: &CompletionSettings) -> Result<Self> {
        let api_key = settings
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| RelayError::Config("gemini backend requires an API key".into()))?;
        Ok(Self {
            client,
            base_url: settings.api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout: settings.timeout()?,
        })
    }

    fn build_request(&self, request: &CompletionRequest) -> Result<ProviderRequest> {
        let mut contents = Vec::new();
        let mut system = Vec::new();
        for message in &request.messages {
            let role = match message.role {
                Role::System => {
                    system.push(Part::text(&message.content));
                    continue;
                }
                Role::User => "user",
                Role::Assistant => "model",
            };
            contents.push(Content {
                parts: vec![Part::text(&message.content)],
                role: Some(role.to_string()),
            });
        }

        let body = GenerateContentRequest {
            contents,
            system_instruction: (!system.is_empty()).then(|| Content {
                parts: system,
                role: None,
            }),
            generation_config: GenerationConfig {
                temperature: request.temperature,
            },
        };

        Ok(ProviderRequest::post(format!(
            "{}/{}:generateContent",
            self.base_url, request.model
        ))
        .header("Content-Type", "application/json")
        .header("x-goog-api-key", self.api_key.as_str())
        .json(serde_json::to_value(&body)?))
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn chat(&self, request: &CompletionRequest) -> Result<CompletionResult> {
        let response = self
            .client
            .execute_with_timeout(self.build_request(request)?, self.timeout)
            .await?;

        let parsed = serde_json::from_str::<GenerateContentResponse>(&response.text);
        if let Ok(GenerateContentResponse {
            error: Some(ref err),
            ..
        }) = parsed
        {
            warn!(code = err.code, "Gemini API error");
            let status = if response.status == 200 { err.code } else { response.status };
            return Err(RelayError::provider(
                status,
                format!("HTTP {}: {}", status, err.message),
            ));
        }
        if response.status != 200 {
            let snippet: String = response.text.chars().take(200).collect();
            return Err(RelayError::provider(
                response.status,
                format!("HTTP {}: {}", response.status, snippet),
            ));
        }

        let body = parsed?;
        let candidate = body
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| RelayError::malformed("response has no candidates"))?;
        let text: String = candidate
            .content
            .unwrap_or_default()
            .parts
            .into_iter()
            .filter(|part| !part.thought)
            .filter_map(|part| part.text)
            .collect();
        let usage = body.usage_metadata.unwrap_or_default();

        debug!(
            model = %request.model,
            finish_reason = candidate.finish_reason.as_deref().unwrap_or("unknown"),
            input_tokens = usage.prompt_token_count,
            output_tokens = usage.candidates_token_count,
            "completion received"
        );

        Ok(CompletionResult::new(
            text,
            TokenUsage {
                input_tokens: usage.prompt_token_count,
                output_tokens: usage.candidates_token_count,
            },
        ))
    }
}
