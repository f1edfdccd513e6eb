//! Tool types for MCP servers.
//!
//! Tools are functions that MCP servers expose for AI assistants to invoke.
//! Each tool has a name, description, and JSON Schema defining its input.

use serde::{Deserialize, Serialize};

use super::content::Content;
use crate::meta::Meta;

/// A tool definition exposed by an MCP server.
///
/// # Example
///
/// ```rust
/// use mcpkit_core::types::Tool;
///
/// let tool = Tool::new("search")
///     .description("Search the database")
///     .input_schema(serde_json::json!({
///         "type": "object",
///         "properties": {
///             "query": { "type": "string" }
///         },
///         "required": ["query"]
///     }));
/// assert_eq!(tool.name, "search");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Unique name of the tool.
    pub name: String,
    /// Human-readable description of what the tool does.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema defining the tool's input parameters.
    pub input_schema: serde_json::Value,
    /// JSON Schema of structured output, if the tool declares one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
}

impl Tool {
    /// Create a new tool accepting an empty object.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {}
            }),
            output_schema: None,
        }
    }

    /// Set the tool's description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the tool's input schema.
    #[must_use]
    pub fn input_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Set the tool's output schema.
    #[must_use]
    pub fn output_schema(mut self, schema: serde_json::Value) -> Self {
        self.output_schema = Some(schema);
        self
    }
}

/// The result of calling a tool.
///
/// Handler failures are reported here with `is_error` set, never as a
/// JSON-RPC error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    /// Result metadata.
    #[serde(rename = "_meta", default, skip_serializing_if = "Meta::is_empty")]
    pub meta: Meta,
    /// The content returned by the tool.
    pub content: Vec<Content>,
    /// If true, this result represents an error.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl CallToolResult {
    /// Create a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::content(vec![Content::text(text)])
    }

    /// Create a successful result with multiple content items.
    #[must_use]
    pub fn content(content: Vec<Content>) -> Self {
        Self {
            meta: Meta::default(),
            content,
            is_error: false,
        }
    }

    /// Create an error result carrying `message` as text.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            meta: Meta::default(),
            content: vec![Content::text(message)],
            is_error: true,
        }
    }
}

/// Params of `tools/list`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListToolsParams {
    /// Request metadata.
    #[serde(rename = "_meta", default, skip_serializing_if = "Meta::is_empty")]
    pub meta: Meta,
    /// Cursor for pagination.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Result of `tools/list`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    /// Result metadata.
    #[serde(rename = "_meta", default, skip_serializing_if = "Meta::is_empty")]
    pub meta: Meta,
    /// One page of tools, ordered by name.
    pub tools: Vec<Tool>,
    /// Cursor for the next page, if more tools exist.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Params of `tools/call`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallToolParams {
    /// Request metadata.
    #[serde(rename = "_meta", default, skip_serializing_if = "Meta::is_empty")]
    pub meta: Meta,
    /// Name of the tool to call.
    pub name: String,
    /// Arguments to pass to the tool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
}

impl CallToolParams {
    /// Create params for calling `name` with `arguments`.
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            meta: Meta::default(),
            name: name.into(),
            arguments: Some(arguments),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_success_result_omits_is_error() {
        let result = CallToolResult::text("hi user");
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"content": [{"type": "text", "text": "hi user"}]})
        );
    }

    #[test]
    fn test_error_result() {
        let result = CallToolResult::error("mcp failure");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["isError"], true);
        assert_eq!(json["content"][0]["text"], "mcp failure");
    }

    #[test]
    fn test_params_meta_round_trip() {
        let mut params = CallToolParams::new("greet", json!({"name": "user"}));
        params.meta = Meta::with_progress_token(3).with("origin", json!("test"));

        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["_meta"], json!({"progressToken": 3, "origin": "test"}));

        let back: CallToolParams = serde_json::from_value(json).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn test_list_result_round_trip() {
        let result = ListToolsResult {
            meta: Meta::new().with("page", json!(1)),
            tools: vec![Tool::new("apple").description("fruit")],
            next_cursor: Some("abc".to_string()),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["nextCursor"], "abc");
        assert_eq!(json["tools"][0]["inputSchema"]["type"], "object");

        let back: ListToolsResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }
}
