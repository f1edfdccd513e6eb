//! The `_meta` field carried by every MCP params and result object.
//!
//! On the wire `_meta` is a plain JSON object. The `progressToken` key is
//! lifted into [`Meta::progress_token`]; every other key is kept verbatim in
//! [`Meta::data`].
//!
//! ```rust
//! use mcpkit_core::meta::Meta;
//! use mcpkit_core::protocol::ProgressToken;
//!
//! let meta: Meta = serde_json::from_str(r#"{"progressToken": 7, "trace": "abc"}"#).unwrap();
//! assert_eq!(meta.progress_token, Some(ProgressToken::Number(7)));
//! assert_eq!(meta.data["trace"], "abc");
//! ```

use serde::de::{self, Deserializer};
use serde::ser::{self, SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::protocol::ProgressToken;

const PROGRESS_TOKEN_KEY: &str = "progressToken";

/// Metadata attached to params and results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Meta {
    /// Token the peer may reference in `notifications/progress`.
    pub progress_token: Option<ProgressToken>,
    /// All other `_meta` entries.
    pub data: Map<String, Value>,
}

impl Meta {
    /// Create empty metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata carrying only a progress token.
    #[must_use]
    pub fn with_progress_token(token: impl Into<ProgressToken>) -> Self {
        Self {
            progress_token: Some(token.into()),
            data: Map::new(),
        }
    }

    /// Add an arbitrary entry.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// True when there is nothing to serialize.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.progress_token.is_none() && self.data.is_empty()
    }
}

impl Serialize for Meta {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.progress_token.is_some() && self.data.contains_key(PROGRESS_TOKEN_KEY) {
            return Err(ser::Error::custom(
                "duplicate progressToken in _meta data and progress_token field",
            ));
        }
        let len = self.data.len() + usize::from(self.progress_token.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        for (key, value) in &self.data {
            map.serialize_entry(key, value)?;
        }
        if let Some(token) = &self.progress_token {
            map.serialize_entry(PROGRESS_TOKEN_KEY, token)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Meta {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut data = Map::deserialize(deserializer)?;
        let progress_token = match data.remove(PROGRESS_TOKEN_KEY) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(ProgressToken::String(s)),
            Some(Value::Number(n)) => match n.as_i64() {
                Some(n) => Some(ProgressToken::Number(n)),
                None => {
                    return Err(de::Error::custom(format!(
                        "bad type for progressToken: {n} is not an integer"
                    )));
                }
            },
            Some(other) => {
                return Err(de::Error::custom(format!(
                    "bad type for progressToken: {other}"
                )));
            }
        };
        Ok(Self {
            progress_token,
            data,
        })
    }
}
