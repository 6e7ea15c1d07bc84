//! Continuation payload codec.
//!
//! An action list travels to the next hop as standard base64 of its compact
//! JSON encoding, in the [`PAYLOAD_HEADER`] request header. The request body
//! stays free for ordinary application data.
//!
//! Inbound payloads are untrusted: [`decode`] enforces size, nesting and
//! repetition limits before anything is interpreted.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::{Action, ActionList};
use crate::error::PayloadError;

/// Header carrying the continuation payload. Header names are
/// case-insensitive; this is the canonical lowercase form.
pub const PAYLOAD_HEADER: &str = "x-simulation-payload";

/// Default maximum encoded payload size (256 KiB).
pub const DEFAULT_MAX_BYTES: usize = 256 * 1024;

/// Default maximum nesting depth of an action tree.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Default maximum `repeat` of a single action.
pub const DEFAULT_MAX_REPEAT: u32 = 10_000;

/// Acceptance limits for inbound payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadLimits {
    /// Maximum length of the encoded header value in bytes.
    pub max_bytes: usize,
    /// Maximum nesting depth; a flat list has depth 1.
    pub max_depth: usize,
    /// Maximum `repeat` of any single action.
    pub max_repeat: u32,
}

impl Default for PayloadLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            max_depth: DEFAULT_MAX_DEPTH,
            max_repeat: DEFAULT_MAX_REPEAT,
        }
    }
}

/// Encode an action list for the payload header.
pub fn encode(actions: &[Action]) -> Result<String, PayloadError> {
    let json = serde_json::to_vec(actions).map_err(|e| PayloadError::Encode(e.to_string()))?;
    Ok(STANDARD.encode(json))
}

/// Decode and validate a payload header value.
///
/// A single encoded action is returned as a one-element list.
pub fn decode(header: &str, limits: &PayloadLimits) -> Result<ActionList, PayloadError> {
    let header = header.trim();
    if header.len() > limits.max_bytes {
        return Err(PayloadError::Malformed(format!(
            "payload is {} bytes, limit is {}",
            header.len(),
            limits.max_bytes
        )));
    }

    let bytes = STANDARD
        .decode(header)
        .map_err(|e| PayloadError::Malformed(format!("invalid base64: {e}")))?;
    let value: Value = serde_json::from_slice(&bytes)
        .map_err(|e| PayloadError::Malformed(format!("invalid JSON: {e}")))?;

    let actions = match value {
        Value::Array(_) => serde_json::from_value::<ActionList>(value),
        Value::Object(_) => serde_json::from_value::<Action>(value).map(|action| vec![action]),
        other => {
            return Err(PayloadError::Malformed(format!(
                "expected an action or a list of actions, got {}",
                json_kind(&other)
            )));
        }
    }
    .map_err(|e| PayloadError::Malformed(e.to_string()))?;

    validate(&actions, limits)?;
    Ok(actions)
}

/// Check a decoded list against `limits`.
pub fn validate(actions: &[Action], limits: &PayloadLimits) -> Result<(), PayloadError> {
    let depth = actions.iter().map(Action::depth).max().unwrap_or(0);
    if depth > limits.max_depth {
        return Err(PayloadError::Malformed(format!(
            "nesting depth {depth} exceeds limit {}",
            limits.max_depth
        )));
    }
    check_repeat(actions, limits.max_repeat)
}

fn check_repeat(actions: &[Action], max_repeat: u32) -> Result<(), PayloadError> {
    for action in actions {
        if action.repeat > max_repeat {
            return Err(PayloadError::Malformed(format!(
                "repeat {} on {} action exceeds limit {max_repeat}",
                action.repeat,
                action.kind.name()
            )));
        }
        check_repeat(action.children(), max_repeat)?;
    }
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
