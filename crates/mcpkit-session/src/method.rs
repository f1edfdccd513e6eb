//! Method tables and typed handler wrappers.
//!
//! A [`MethodInfo`] turns a typed handler `(Context, Arc<S>, P) -> R` into
//! the untyped [`MethodHandler`] the session dispatches through: params
//! are decoded from JSON (absent params decode as `{}`) and the result is
//! encoded back. A [`MethodTable`] maps method names to these records.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use mcpkit_core::error::McpError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::Context;

/// An untyped method handler for session type `S`.
///
/// Receives the request context, the session, the method name and the raw
/// params, and returns the raw result.
pub type MethodHandler<S> = Arc<
    dyn Fn(Context, Arc<S>, String, Value) -> BoxFuture<'static, Result<Value, McpError>>
        + Send
        + Sync,
>;

/// Decode `params` for `method`, treating `null` as an empty object.
pub fn decode_params<P: DeserializeOwned>(method: &str, params: Value) -> Result<P, McpError> {
    let params = if params.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        params
    };
    serde_json::from_value(params)
        .map_err(|e| McpError::invalid_params(method, format!("invalid params: {e}")))
}

/// Encode a handler result.
pub fn encode_result<R: Serialize>(method: &str, result: &R) -> Result<Value, McpError> {
    serde_json::to_value(result)
        .map_err(|e| McpError::internal(format!("failed to encode {method} result: {e}")))
}

/// A method a session can handle.
pub struct MethodInfo<S> {
    handler: MethodHandler<S>,
}

impl<S> Clone for MethodInfo<S> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<S: Send + Sync + 'static> MethodInfo<S> {
    /// Wrap a typed request handler.
    pub fn request<P, R, F, Fut>(handler: F) -> Self
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(Context, Arc<S>, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, McpError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        Self {
            handler: Arc::new(move |ctx, session, method, params| {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    let params: P = decode_params(&method, params)?;
                    let result = handler(ctx, session, params).await?;
                    encode_result(&method, &result)
                })
            }),
        }
    }

    /// Wrap a typed notification handler. The result is always `null`.
    pub fn notification<P, F, Fut>(handler: F) -> Self
    where
        P: DeserializeOwned + Send + 'static,
        F: Fn(Context, Arc<S>, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), McpError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        Self {
            handler: Arc::new(move |ctx, session, method, params| {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    let params: P = decode_params(&method, params)?;
                    handler(ctx, session, params).await?;
                    Ok(Value::Null)
                })
            }),
        }
    }

    /// The untyped handler.
    #[must_use]
    pub fn handler(&self) -> &MethodHandler<S> {
        &self.handler
    }
}

/// Method name to handler.
pub struct MethodTable<S> {
    methods: HashMap<&'static str, MethodInfo<S>>,
}

impl<S> Default for MethodTable<S> {
    fn default() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }
}

impl<S: Send + Sync + 'static> MethodTable<S> {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a method.
    #[must_use]
    pub fn with(mut self, method: &'static str, info: MethodInfo<S>) -> Self {
        self.methods.insert(method, info);
        self
    }

    /// Look up a method.
    #[must_use]
    pub fn get(&self, method: &str) -> Option<&MethodInfo<S>> {
        self.methods.get(method)
    }

    /// Whether the table has `method`.
    #[must_use]
    pub fn contains(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// Build the default receiving handler: look the method up and run it.
    ///
    /// Unknown methods fail with "method not found".
    #[must_use]
    pub fn into_handler(self) -> MethodHandler<S> {
        let table = Arc::new(self);
        Arc::new(move |ctx, session, method, params| match table.get(&method) {
            Some(info) => (info.handler())(ctx, session, method, params),
            None => Box::pin(async move { Err(McpError::method_not_found(method)) }),
        })
    }
}
