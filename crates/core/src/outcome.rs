use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Acknowledgement produced by the fixed, side-effect-only action kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Ack {
    Logged { message: String },
    Waited { duration: u64 },
    Set { key: String, value: Value },
}

impl Ack {
    pub fn into_value(self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Soft diagnostic for an action kind this runtime does not know.
pub fn unknown_kind(kind: &str) -> Value {
    json!({ "error": format!("Unknown action type: {kind}") })
}

/// Structured failure value returned in place of a result when an
/// invocation aborts.
pub fn failure(message: impl Into<String>, code: &str) -> Value {
    json!({ "error": message.into(), "code": code })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_shapes() {
        assert_eq!(
            Ack::Logged {
                message: "hi".into()
            }
            .into_value(),
            json!({"status": "logged", "message": "hi"})
        );
        assert_eq!(
            Ack::Waited { duration: 200 }.into_value(),
            json!({"status": "waited", "duration": 200})
        );
        assert_eq!(
            Ack::Set {
                key: "x".into(),
                value: json!(1)
            }
            .into_value(),
            json!({"status": "set", "key": "x", "value": 1})
        );
    }

    #[test]
    fn diagnostics() {
        assert_eq!(
            unknown_kind("teleport"),
            json!({"error": "Unknown action type: teleport"})
        );
        assert_eq!(
            failure("boom", "SCRIPT_FAULT"),
            json!({"error": "boom", "code": "SCRIPT_FAULT"})
        );
    }
}
