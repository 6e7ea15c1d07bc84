//! hopsim HTTP client
//!
//! Network side of a hopsim node:
//!
//! - [`HttpDispatcher`] sends `http` actions to the next hop, carrying the
//!   continuation program in the `x-simulation-payload` header;
//! - [`HttpScriptClient`] backs the `http` object available to scripts;
//! - [`NodeClient`] talks to a running node from outside: health, greet, and
//!   root calls that start a request tree.
//!
//! All three propagate W3C trace context when telemetry is active.

mod dispatcher;
mod error;
mod node_client;
mod script_http;
pub mod trace_context;

pub use dispatcher::HttpDispatcher;
pub use error::Error;
pub use node_client::{HealthStatus, NodeClient, NodeClientBuilder};
pub use script_http::HttpScriptClient;

use std::time::Duration;

use serde_json::Value;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Parse a response body. An empty body is `null`.
pub(crate) fn parse_body(bytes: &[u8]) -> Result<Value, serde_json::Error> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(bytes)
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_body_parses_as_null() {
        assert_eq!(parse_body(b"").unwrap(), Value::Null);
        assert_eq!(parse_body(b"  \n").unwrap(), Value::Null);
    }

    #[test]
    fn json_body_parses() {
        assert_eq!(parse_body(br#"{"a":[1]}"#).unwrap(), json!({"a": [1]}));
        assert_eq!(parse_body(b"\"done\"").unwrap(), json!("done"));
        assert!(parse_body(b"<html>").is_err());
    }
}
