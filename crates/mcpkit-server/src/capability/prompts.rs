//! Prompt registration.
//!
//! [`ServerPrompt::typed`] infers the prompt's argument list from a struct:
//! every property becomes an argument, required unless the field may be
//! omitted (an `Option` or a `#[serde(default)]` field).

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use mcpkit_core::error::McpError;
use mcpkit_core::methods;
use mcpkit_core::types::{GetPromptParams, GetPromptResult, Prompt, PromptArgument};
use mcpkit_session::Context;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::tools::{decode_strict, input_schema};
use crate::session::ServerSession;

/// Handles `prompts/get` for one prompt.
pub type PromptHandler = Arc<
    dyn Fn(Context, Arc<ServerSession>, GetPromptParams) -> BoxFuture<'static, Result<GetPromptResult, McpError>>
        + Send
        + Sync,
>;

/// A prompt declaration and its handler.
#[derive(Clone)]
pub struct ServerPrompt {
    /// The declaration advertised in `prompts/list`.
    pub prompt: Prompt,
    /// The handler run by `prompts/get`.
    pub handler: PromptHandler,
}

impl fmt::Debug for ServerPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerPrompt")
            .field("prompt", &self.prompt)
            .finish_non_exhaustive()
    }
}

impl ServerPrompt {
    /// A prompt with a raw handler.
    pub fn new<F, Fut>(prompt: Prompt, handler: F) -> Self
    where
        F: Fn(Context, Arc<ServerSession>, GetPromptParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<GetPromptResult, McpError>> + Send + 'static,
    {
        Self {
            prompt,
            handler: Arc::new(move |ctx, session, params| Box::pin(handler(ctx, session, params))),
        }
    }

    /// A prompt whose arguments decode into `A`.
    ///
    /// Unlike tools, a prompt has no error shape of its own: arguments that
    /// fail to decode are an invalid-params error.
    pub fn typed<A, F, Fut>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        A: DeserializeOwned + JsonSchema + Send + 'static,
        F: Fn(Context, Arc<ServerSession>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<GetPromptResult, McpError>> + Send + 'static,
    {
        let schema = input_schema::<A>();
        let mut prompt = Prompt::new(name).description(description);
        for argument in arguments_of(&schema) {
            prompt = prompt.argument(argument);
        }
        let handler = Arc::new(handler);

        Self {
            prompt,
            handler: Arc::new(move |ctx, session, params| {
                let handler = Arc::clone(&handler);
                let schema = schema.clone();
                Box::pin(async move {
                    let arguments = string_map(params.arguments);
                    let args = decode_strict::<A>(&schema, arguments).map_err(|e| {
                        McpError::invalid_params(
                            methods::PROMPTS_GET,
                            format!("invalid arguments for prompt {:?}: {e}", params.name),
                        )
                    })?;
                    handler(ctx, session, args).await
                })
            }),
        }
    }

    /// The prompt name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.prompt.name
    }
}

pub(crate) fn prompt_key(prompt: &ServerPrompt) -> &str {
    &prompt.prompt.name
}

fn arguments_of(schema: &Value) -> Vec<PromptArgument> {
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut arguments: Vec<PromptArgument> = properties
        .iter()
        .map(|(name, property)| {
            let mut argument = if required.contains(&name.as_str()) {
                PromptArgument::required(name.clone())
            } else {
                PromptArgument::optional(name.clone())
            };
            if let Some(description) = property.get("description").and_then(Value::as_str) {
                argument = argument.description(description);
            }
            argument
        })
        .collect();
    arguments.sort_by(|a, b| a.name.cmp(&b.name));
    arguments
}

fn string_map(arguments: HashMap<String, String>) -> Value {
    Value::Object(
        arguments
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect::<Map<String, Value>>(),
    )
}
