// ── Inbound payload decoding ──
//
// Payloads are UTF-8 JSON. Some publishers pad fixed-size buffers with
// trailing NUL bytes, so those are stripped before parsing.

use serde_json::Value;

use crate::error::Error;

/// Decode a raw payload into structured data.
pub fn decode_payload(raw: &[u8]) -> Result<Value, Error> {
    let text = std::str::from_utf8(raw)?;
    let value = serde_json::from_str(text.trim_end_matches('\0'))?;
    Ok(value)
}
