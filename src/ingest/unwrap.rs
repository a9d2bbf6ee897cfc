//! Payload unwrapping
//!
//! Some upstream clients JSON-encode an already-serialized JSON document,
//! producing a JSON string whose contents are the real payload. This module
//! undoes exactly one level of that double-encoding.

/// Undo accidental double-encoding of a JSON body.
///
/// If the body decodes as a JSON string and that string is itself valid
/// JSON, the inner bytes are returned; otherwise the input comes back
/// unchanged. One pass only: a once-unwrapped value is ordinary JSON, not a
/// JSON string, so applying this twice is a no-op.
pub fn unwrap_payload(body: &[u8]) -> Vec<u8> {
    if let Ok(inner) = serde_json::from_slice::<String>(body)
        && serde_json::from_str::<serde_json::Value>(&inner).is_ok()
    {
        return inner.into_bytes();
    }
    body.to_vec()
}
