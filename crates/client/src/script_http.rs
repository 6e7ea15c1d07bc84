use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::{debug, warn};

use hopsim_script::{ScriptError, ScriptHttp};

use crate::trace_context::inject_trace_context;
use crate::{DEFAULT_TIMEOUT, Error, parse_body};

/// The `http` capability handed to scripts, backed by reqwest.
///
/// Plain requests: no continuation payload is attached. Any status is
/// accepted and the parsed body is returned.
#[derive(Debug, Clone)]
pub struct HttpScriptClient {
    client: Client,
}

impl HttpScriptClient {
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Configuration(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for HttpScriptClient {
    fn default() -> Self {
        Self::with_client(
            Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .unwrap_or_default(),
        )
    }
}

#[async_trait]
impl ScriptHttp for HttpScriptClient {
    async fn request(
        &self,
        method: &str,
        url: &str,
        body: Option<Value>,
    ) -> Result<Value, ScriptError> {
        let verb = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| ScriptError::Capability(format!("invalid HTTP method: {method}")))?;

        let mut headers = HeaderMap::new();
        inject_trace_context(&mut headers);

        let mut builder = self.client.request(verb, url).headers(headers);
        if let Some(body) = &body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ScriptError::Capability(format!("{method} {url}: {e}")))?;
        let status = response.status();
        if status.is_success() {
            debug!(url, status = status.as_u16(), "script request completed");
        } else {
            warn!(url, status = status.as_u16(), "script request got non-success status");
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ScriptError::Capability(format!("{method} {url}: {e}")))?;
        parse_body(&bytes)
            .map_err(|e| ScriptError::Capability(format!("{method} {url}: invalid JSON: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use axum::Json;
    use axum::Router;
    use axum::routing::{get, post};
    use serde_json::json;

    use hopsim_core::ContextStore;
    use hopsim_script::{Sandbox, SandboxConfig, ScriptHook};

    use super::*;
    use crate::testing::{closed_port, serve};

    async fn users() -> String {
        serve(
            Router::new()
                .route("/users/1", get(|| async { Json(json!({"id": 1, "name": "ada"})) }))
                .route(
                    "/users",
                    post(|Json(body): Json<Value>| async move { Json(json!({"created": body})) }),
                ),
        )
        .await
    }

    #[tokio::test]
    async fn get_returns_parsed_body() {
        let base = users().await;
        let value = HttpScriptClient::default()
            .request("get", &format!("{base}/users/1"), None)
            .await
            .unwrap();
        assert_eq!(value["name"], json!("ada"));
    }

    #[tokio::test]
    async fn post_sends_json_body() {
        let base = users().await;
        let value = HttpScriptClient::default()
            .request("POST", &format!("{base}/users"), Some(json!({"name": "bob"})))
            .await
            .unwrap();
        assert_eq!(value, json!({"created": {"name": "bob"}}));
    }

    #[tokio::test]
    async fn unreachable_host_is_capability_error() {
        let url = format!("http://127.0.0.1:{}/", closed_port().await);
        let err = HttpScriptClient::default()
            .request("GET", &url, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ScriptError::Capability(_)));
        assert_eq!(err.code(), "SCRIPT_FAULT");
    }

    #[tokio::test]
    async fn scripts_can_call_out() {
        let base = users().await;
        let sandbox = Sandbox::new(SandboxConfig::default())
            .unwrap()
            .with_http(std::sync::Arc::new(HttpScriptClient::default()));
        let mut ctx = ContextStore::new();
        ctx.set("base", json!(base));

        let value = sandbox
            .run(
                "let user = http.get(ctx.base + '/users/1'); ctx.name = user.name; return user.id",
                &mut ctx,
            )
            .await
            .unwrap();
        assert_eq!(value, json!(1));
        assert_eq!(ctx.get("name"), Some(&json!("ada")));
    }
}
