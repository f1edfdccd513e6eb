//! Tool registration.
//!
//! A [`ServerTool`] pairs a [`Tool`] declaration with its handler. Raw
//! handlers see the `tools/call` params as sent; [`ServerTool::typed`]
//! derives the input schema from the argument type and decodes arguments
//! strictly before calling the handler.
//!
//! Tool failures never become JSON-RPC errors: decode failures and handler
//! errors are both reported as a [`CallToolResult`] with `isError` set.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use mcpkit_core::error::McpError;
use mcpkit_core::types::{CallToolParams, CallToolResult, Tool};
use mcpkit_session::Context;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::session::ServerSession;

/// Handles `tools/call` for one tool.
pub type ToolHandler = Arc<
    dyn Fn(Context, Arc<ServerSession>, CallToolParams) -> BoxFuture<'static, Result<CallToolResult, McpError>>
        + Send
        + Sync,
>;

/// A tool declaration and its handler.
#[derive(Clone)]
pub struct ServerTool {
    /// The declaration advertised in `tools/list`.
    pub tool: Tool,
    /// The handler run by `tools/call`.
    pub handler: ToolHandler,
}

impl fmt::Debug for ServerTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerTool")
            .field("tool", &self.tool)
            .finish_non_exhaustive()
    }
}

impl ServerTool {
    /// A tool with a raw handler.
    pub fn new<F, Fut>(tool: Tool, handler: F) -> Self
    where
        F: Fn(Context, Arc<ServerSession>, CallToolParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<CallToolResult, McpError>> + Send + 'static,
    {
        Self {
            tool,
            handler: Arc::new(move |ctx, session, params| Box::pin(handler(ctx, session, params))),
        }
    }

    /// A tool whose arguments decode into `In`.
    ///
    /// The input schema is generated from `In` and closed to unknown
    /// properties. Arguments with unknown fields, or that fail to decode,
    /// produce an error result without calling `handler`. An `Err` from
    /// `handler` becomes an error result carrying its message.
    pub fn typed<In, F, Fut, E>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        In: DeserializeOwned + JsonSchema + Send + 'static,
        F: Fn(Context, Arc<ServerSession>, In) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<CallToolResult, E>> + Send + 'static,
        E: fmt::Display,
    {
        let schema = input_schema::<In>();
        let tool = Tool::new(name)
            .description(description)
            .input_schema(schema.clone());
        let handler = Arc::new(handler);

        Self {
            tool,
            handler: Arc::new(move |ctx, session, params| {
                let handler = Arc::clone(&handler);
                let schema = schema.clone();
                Box::pin(async move {
                    let arguments = params
                        .arguments
                        .unwrap_or_else(|| Value::Object(Map::new()));
                    let input = match decode_strict::<In>(&schema, arguments) {
                        Ok(input) => input,
                        Err(message) => {
                            return Ok(CallToolResult::error(format!(
                                "invalid arguments for tool {:?}: {message}",
                                params.name
                            )));
                        }
                    };
                    Ok(match handler(ctx, session, input).await {
                        Ok(result) => result,
                        Err(e) => CallToolResult::error(e.to_string()),
                    })
                })
            }),
        }
    }

    /// The tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.tool.name
    }
}

pub(crate) fn tool_key(tool: &ServerTool) -> &str {
    &tool.tool.name
}

/// The JSON schema of `T`, closed to properties it does not declare.
#[must_use]
pub fn input_schema<T: JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| {
        serde_json::json!({"type": "object", "properties": {}})
    });
    if let Some(object) = value.as_object_mut() {
        object.remove("$schema");
        if object.get("type").and_then(Value::as_str) == Some("object") {
            object
                .entry("properties")
                .or_insert_with(|| Value::Object(Map::new()));
            object
                .entry("additionalProperties")
                .or_insert(Value::Bool(false));
        }
    }
    value
}

/// Decode `value` into `T`, rejecting top-level fields the schema does not
/// declare when it is closed.
pub(crate) fn decode_strict<T: DeserializeOwned>(schema: &Value, value: Value) -> Result<T, String> {
    if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
        if let Some(fields) = value.as_object() {
            let known = schema.get("properties").and_then(Value::as_object);
            for field in fields.keys() {
                if !known.is_some_and(|known| known.contains_key(field)) {
                    return Err(format!("unknown field {field:?}"));
                }
            }
        }
    }
    serde_json::from_value(value).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize, JsonSchema)]
    struct GreetArgs {
        name: String,
        #[serde(default)]
        shout: bool,
    }

    #[test]
    fn test_input_schema_is_closed() {
        let schema = input_schema::<GreetArgs>();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["additionalProperties"], false);
        assert!(schema["properties"]["name"].is_object());
        assert_eq!(schema["required"], json!(["name"]));
        assert!(schema.get("$schema").is_none());
    }

    #[test]
    fn test_decode_strict() {
        let schema = input_schema::<GreetArgs>();

        let args: GreetArgs = decode_strict(&schema, json!({"name": "user"})).unwrap();
        assert_eq!(args.name, "user");
        assert!(!args.shout);

        let err = decode_strict::<GreetArgs>(&schema, json!({"name": "user", "extra": 1}))
            .err()
            .unwrap();
        assert!(err.contains("unknown field \"extra\""), "{err}");

        assert!(decode_strict::<GreetArgs>(&schema, json!({})).is_err());
    }
}
