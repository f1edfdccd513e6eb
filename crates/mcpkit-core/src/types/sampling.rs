//! Sampling types.
//!
//! Sampling lets a server ask the client for an LLM completion through
//! `sampling/createMessage`. The client answers only when it has a sampling
//! handler installed.

use serde::{Deserialize, Serialize};

use super::content::{Content, Role};
use crate::meta::Meta;

/// A message in a sampling conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingMessage {
    /// The role of the message sender.
    pub role: Role,
    /// The message content.
    pub content: Content,
}

impl SamplingMessage {
    /// Create a user message with text content.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::text(text),
        }
    }

    /// Create an assistant message with text content.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::text(text),
        }
    }
}

/// Model preferences for sampling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPreferences {
    /// Hints for model selection.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<ModelHint>,
    /// Priority for cost optimization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_priority: Option<f64>,
    /// Priority for speed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_priority: Option<f64>,
    /// Priority for intelligence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intelligence_priority: Option<f64>,
}

/// A hint for model selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelHint {
    /// Model name or family.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// What context the client should include in sampling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IncludeContext {
    /// Include no additional context.
    #[default]
    None,
    /// Include context from this server only.
    ThisServer,
    /// Include context from all connected servers.
    AllServers,
}

/// Params of `sampling/createMessage`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageParams {
    /// Request metadata.
    #[serde(rename = "_meta", default, skip_serializing_if = "Meta::is_empty")]
    pub meta: Meta,
    /// Conversation so far.
    pub messages: Vec<SamplingMessage>,
    /// Maximum number of tokens to generate.
    pub max_tokens: u32,
    /// Model preferences.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_preferences: Option<ModelPreferences>,
    /// System prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Context to include.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_context: Option<IncludeContext>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Sequences that stop generation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
    /// Provider-specific metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl CreateMessageParams {
    /// Create params for a single user prompt.
    #[must_use]
    pub fn simple(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            messages: vec![SamplingMessage::user(prompt)],
            max_tokens,
            ..Self::default()
        }
    }
}

/// Result of `sampling/createMessage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageResult {
    /// Result metadata.
    #[serde(rename = "_meta", default, skip_serializing_if = "Meta::is_empty")]
    pub meta: Meta,
    /// The role of the response.
    pub role: Role,
    /// The generated content.
    pub content: Content,
    /// The model used.
    pub model: String,
    /// Why generation stopped (e.g., `endTurn`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

impl CreateMessageResult {
    /// Create an assistant text result.
    #[must_use]
    pub fn text(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            meta: Meta::default(),
            role: Role::Assistant,
            content: Content::text(text),
            model: model.into(),
            stop_reason: Some("endTurn".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_params_wire_names() {
        let mut params = CreateMessageParams::simple("What is 2+2?", 100);
        params.include_context = Some(IncludeContext::ThisServer);
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["maxTokens"], 100);
        assert_eq!(json["includeContext"], "thisServer");
        assert_eq!(serde_json::from_value::<CreateMessageParams>(json).unwrap(), params);
    }

    #[test]
    fn test_result_round_trip() {
        let result = CreateMessageResult::text("m", "4");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            json!({
                "role": "assistant",
                "content": {"type": "text", "text": "4"},
                "model": "m",
                "stopReason": "endTurn",
            })
        );
        assert_eq!(serde_json::from_value::<CreateMessageResult>(json).unwrap(), result);
    }
}
