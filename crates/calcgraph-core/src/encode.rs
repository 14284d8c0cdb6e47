//! JSON encoding of node values.
//!
//! A node's `value` column always holds JSON text: a bare `50` for numbers and
//! a quoted `"#REF!"` for sentinels, so a sentinel and an ordinary string
//! result stay distinguishable only by content, never by representation. The
//! empty string marks a node that has never been evaluated and decodes as
//! JSON `null`.

use serde_json::Value;

use crate::error::CoreError;
use crate::sentinel::Sentinel;

/// Encodes a computed value for storage.
pub fn encode_value(value: &Value) -> Result<String, CoreError> {
    Ok(serde_json::to_string(value)?)
}

/// Decodes a stored value. `""` decodes as `null`.
pub fn decode_value(raw: &str) -> Result<Value, CoreError> {
    if raw.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(raw).map_err(|source| CoreError::InvalidValue {
        raw: raw.to_string(),
        source,
    })
}

/// The stored form of a sentinel, e.g. `"\"#REF!\""`.
pub fn encode_sentinel(sentinel: Sentinel) -> String {
    format!("\"{}\"", sentinel.token())
}

/// Returns the sentinel a decoded value carries, if any.
pub fn as_sentinel(value: &Value) -> Option<Sentinel> {
    value.as_str().and_then(Sentinel::from_token)
}
