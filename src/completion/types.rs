//! Chat completion request and result types

use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};

/// Speaker of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A bare prompt is a user turn
impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self::user(text)
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self::user(text)
    }
}

/// A chat completion call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f64,
    /// Overrides the orchestrator's attempt budget for this call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tries: Option<u32>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: 1.0,
            max_tries: None,
        }
    }

    /// Single-turn request carrying one user message
    pub fn prompt(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(model, vec![Message::user(text)])
    }

    /// Build from a loosely typed message list, e.g. `[{"role": "user", "content": "hi"}]`
    pub fn from_json_messages(model: impl Into<String>, messages: &serde_json::Value) -> Result<Self> {
        let messages: Vec<Message> = serde_json::from_value(messages.clone()).map_err(|e| {
            RelayError::InvalidParameter(format!(
                "messages must be a list of {{role, content}} objects: {}",
                e
            ))
        })?;
        let request = Self::new(model, messages);
        request.validate()?;
        Ok(request)
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = Some(max_tries);
        self
    }

    /// Reject empty conversations and blank model ids
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(RelayError::InvalidParameter("model must not be empty".into()));
        }
        if self.messages.is_empty() {
            return Err(RelayError::InvalidParameter(
                "messages must contain at least one entry".into(),
            ));
        }
        Ok(())
    }

    /// Rough size for log lines
    pub fn content_len(&self) -> usize {
        self.messages.iter().map(|m| m.content.len()).sum()
    }
}

/// Token accounting for one call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Completed chat response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResult {
    pub content: String,
    pub usage: TokenUsage,
}

impl CompletionResult {
    pub fn new(content: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            content: content.into(),
            usage,
        }
    }

    /// Slot value for a call that produced no response
    pub fn failed(err: &RelayError) -> Self {
        Self::new(format!("Request failed: {}", err), TokenUsage::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_is_single_user_message() {
        let request = CompletionRequest::prompt("m", "hello");
        assert_eq!(request.messages, vec![Message::user("hello")]);
        assert!(request.validate().is_ok());

        let from_str = CompletionRequest::new("m", vec!["hello".into()]);
        assert_eq!(from_str.messages, request.messages);
    }

    #[test]
    fn test_validation() {
        let empty = CompletionRequest::new("m", vec![]);
        assert!(matches!(
            empty.validate(),
            Err(RelayError::InvalidParameter(_))
        ));

        let blank_model = CompletionRequest::prompt("  ", "hi");
        assert!(blank_model.validate().is_err());
    }

    #[test]
    fn test_from_json_messages() {
        let messages = serde_json::json!([
            {"role": "system", "content": "be brief"},
            {"role": "user", "content": "hi"}
        ]);
        let request = CompletionRequest::from_json_messages("m", &messages).unwrap();
        assert_eq!(request.messages[0].role, Role::System);

        let missing_content = serde_json::json!([{"role": "user"}]);
        assert!(matches!(
            CompletionRequest::from_json_messages("m", &missing_content),
            Err(RelayError::InvalidParameter(_))
        ));

        let bad_role = serde_json::json!([{"role": "tool", "content": "x"}]);
        assert!(CompletionRequest::from_json_messages("m", &bad_role).is_err());
    }

    #[test]
    fn test_failed_slot_describes_error() {
        let result = CompletionResult::failed(&RelayError::Transport("reset".into()));
        assert!(result.content.contains("reset"));
        assert_eq!(result.usage.total(), 0);
    }
}
