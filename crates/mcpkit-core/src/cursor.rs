//! Opaque pagination cursors.
//!
//! A cursor names the last key returned on the previous page. It is encoded
//! as a 4-byte big-endian length, followed by the UTF-8 key, all wrapped in
//! URL-safe base64. Clients must treat it as opaque.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;

use crate::error::McpError;

/// Encode the last key of a page as a cursor.
#[must_use]
pub fn encode_cursor(last_uid: &str) -> String {
    let mut buf = Vec::with_capacity(4 + last_uid.len());
    buf.extend_from_slice(&(last_uid.len() as u32).to_be_bytes());
    buf.extend_from_slice(last_uid.as_bytes());
    URL_SAFE.encode(buf)
}

/// Decode a cursor back to the last key of the previous page.
///
/// Any malformed cursor is an invalid-params error for `method`.
pub fn decode_cursor(method: &str, cursor: &str) -> Result<String, McpError> {
    let invalid = |reason: &str| McpError::invalid_params(method, format!("invalid cursor: {reason}"));

    let bytes = URL_SAFE
        .decode(cursor)
        .map_err(|_| invalid("not base64"))?;
    let Some((len, rest)) = bytes.split_first_chunk::<4>() else {
        return Err(invalid("truncated"));
    };
    if u32::from_be_bytes(*len) as usize != rest.len() {
        return Err(invalid("length mismatch"));
    }
    String::from_utf8(rest.to_vec()).map_err(|_| invalid("not utf-8"))
}
