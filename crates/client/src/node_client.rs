use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use hopsim_core::payload;
use hopsim_core::{Action, PAYLOAD_HEADER};

use crate::trace_context::inject_trace_context;
use crate::{DEFAULT_TIMEOUT, Error, parse_body};

/// Body of `GET /api/v1/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

#[derive(Debug, Deserialize)]
struct Greeting {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Builder for configuring a [`NodeClient`].
#[derive(Debug)]
pub struct NodeClientBuilder {
    base_url: String,
    timeout: Duration,
    client: Option<Client>,
}

impl NodeClientBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
            client: None,
        }
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a custom reqwest client. The builder's timeout is then ignored.
    #[must_use]
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> Result<NodeClient, Error> {
        let client = match self.client {
            Some(c) => c,
            None => Client::builder()
                .timeout(self.timeout)
                .build()
                .map_err(|e| Error::Configuration(e.to_string()))?,
        };

        Ok(NodeClient {
            client,
            base_url: self.base_url,
        })
    }
}

/// Client for one running node.
///
/// Covers the auxiliary endpoints and root calls that start a request tree.
///
/// ```no_run
/// # async fn example() -> Result<(), hopsim_client::Error> {
/// use hopsim_client::NodeClient;
/// use hopsim_core::Action;
///
/// let client = NodeClient::builder("http://localhost:3000").build()?;
/// assert!(client.health().await?.is_ok());
///
/// let result = client
///     .trigger("POST", "/checkout", &[Action::set("x", 1), Action::ret("${x}")])
///     .await?;
/// assert_eq!(result, serde_json::json!("1"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct NodeClient {
    client: Client,
    base_url: String,
}

impl NodeClient {
    pub fn builder(base_url: impl Into<String>) -> NodeClientBuilder {
        NodeClientBuilder::new(base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<HealthStatus, Error> {
        let url = format!("{}/api/v1/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Http {
                status: response.status().as_u16(),
                message: format!("Health check failed: {}", response.status()),
            });
        }
        response
            .json::<HealthStatus>()
            .await
            .map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Call the greet endpoint. Without a name the node greets `World`.
    pub async fn greet(&self, name: Option<&str>) -> Result<String, Error> {
        let url = format!("{}/api/v1/greet", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(name) = name {
            request = request.query(&[("name", name)]);
        }
        let response = request
            .send()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Http {
                status: response.status().as_u16(),
                message: format!("Greet failed: {}", response.status()),
            });
        }
        let greeting = response
            .json::<Greeting>()
            .await
            .map_err(|e| Error::Deserialization(e.to_string()))?;
        Ok(greeting.message)
    }

    /// Send a root call carrying `actions` and return the node's result.
    ///
    /// A failure value from the node is a successful call; only payload
    /// rejections and other non-2xx statuses are errors.
    pub async fn trigger(
        &self,
        method: &str,
        path: &str,
        actions: &[Action],
    ) -> Result<Value, Error> {
        self.trigger_with_body(method, path, actions, None).await
    }

    /// Like [`trigger`](Self::trigger), with an application JSON body.
    pub async fn trigger_with_body(
        &self,
        method: &str,
        path: &str,
        actions: &[Action],
        body: Option<&Value>,
    ) -> Result<Value, Error> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| Error::Configuration(format!("invalid HTTP method: {method}")))?;
        let url = format!("{}{path}", self.base_url);

        let mut headers = HeaderMap::new();
        inject_trace_context(&mut headers);
        let mut request = self
            .client
            .request(method, &url)
            .headers(headers)
            .header(PAYLOAD_HEADER, payload::encode(actions)?);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        if status.is_success() {
            parse_body(&bytes).map_err(|e| Error::Deserialization(e.to_string()))
        } else {
            let message = serde_json::from_slice::<ErrorBody>(&bytes)
                .map_or_else(|_| format!("Trigger failed: {status}"), |b| b.error);
            Err(Error::Http {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::Json;
    use axum::Router;
    use axum::extract::Query;
    use axum::http::{HeaderMap as AxumHeaders, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use serde_json::json;
    use std::collections::HashMap;

    use hopsim_core::payload::PayloadLimits;

    use super::*;
    use crate::testing::{closed_port, serve};

    async fn fake_node(headers: AxumHeaders) -> impl IntoResponse {
        let Some(raw) = headers.get(PAYLOAD_HEADER).and_then(|v| v.to_str().ok()) else {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Missing X-Simulation-Payload header"})),
            );
        };
        match payload::decode(raw, &PayloadLimits::default()) {
            Ok(actions) => (StatusCode::OK, Json(json!({"received": actions.len()}))),
            Err(_) => (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Invalid simulation payload"})),
            ),
        }
    }

    async fn node() -> NodeClient {
        let router = Router::new()
            .route(
                "/api/v1/health",
                get(|| async { Json(json!({"status": "ok", "service": "auth"})) }),
            )
            .route(
                "/api/v1/greet",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    let name = q.get("name").cloned().unwrap_or_else(|| "World".into());
                    Json(json!({"message": format!("Hello, {name}!")}))
                }),
            )
            .fallback(fake_node);
        NodeClient::builder(format!("{}/", serve(router).await))
            .build()
            .unwrap()
    }

    #[test]
    fn builder_trims_trailing_slash() {
        let client = NodeClient::builder("http://localhost:3000/").build().unwrap();
        assert_eq!(client.base_url(), "http://localhost:3000");
    }

    #[tokio::test]
    async fn health_reports_service() {
        let health = node().await.health().await.unwrap();
        assert!(health.is_ok());
        assert_eq!(health.service, "auth");
    }

    #[tokio::test]
    async fn greet_with_and_without_name() {
        let client = node().await;
        assert_eq!(client.greet(None).await.unwrap(), "Hello, World!");
        assert_eq!(client.greet(Some("Ada")).await.unwrap(), "Hello, Ada!");
    }

    #[tokio::test]
    async fn trigger_sends_actions() {
        let value = node()
            .await
            .trigger("post", "/orders", &[Action::log("a"), Action::ret(1)])
            .await
            .unwrap();
        assert_eq!(value, json!({"received": 2}));
    }

    #[tokio::test]
    async fn connection_failure() {
        let client = NodeClient::builder(format!("http://127.0.0.1:{}", closed_port().await))
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        let err = client.health().await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }

    #[tokio::test]
    async fn invalid_method_is_configuration_error() {
        let err = node()
            .await
            .trigger("BAD METHOD", "/", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
