use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use hopsim_core::payload;
use hopsim_core::{NodeDirectory, PAYLOAD_HEADER, Target};
use hopsim_executor::{DispatchError, DispatchRequest, Dispatcher};

use crate::trace_context::inject_trace_context;
use crate::{Error, parse_body};

/// [`Dispatcher`] that sends continuation calls over HTTP.
///
/// Logical node references resolve through a shared [`NodeDirectory`].
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    client: Client,
    directory: Arc<NodeDirectory>,
}

impl HttpDispatcher {
    /// Build a dispatcher with its own connection pool and the given
    /// per-request timeout.
    pub fn new(directory: Arc<NodeDirectory>, timeout: Duration) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Configuration(e.to_string()))?;
        Ok(Self::with_client(client, directory))
    }

    /// Use a preconfigured reqwest client.
    pub fn with_client(client: Client, directory: Arc<NodeDirectory>) -> Self {
        Self { client, directory }
    }

    pub fn directory(&self) -> &NodeDirectory {
        &self.directory
    }

    fn resolve(&self, target: &Target) -> Result<String, DispatchError> {
        self.directory.resolve(target).ok_or_else(|| match target {
            Target::Node { name, .. } => DispatchError::UnknownNode(name.clone()),
            Target::Url(url) => DispatchError::InvalidTarget(url.clone()),
        })
    }

    /// Caller headers first, then the payload header, then trace context.
    fn headers(request: &DispatchRequest) -> Result<HeaderMap, DispatchError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!(header = %name, "skipping invalid request header"),
            }
        }

        let encoded = payload::encode(&request.actions)?;
        let value = HeaderValue::from_str(&encoded)
            .map_err(|e| DispatchError::Transport(format!("payload header: {e}")))?;
        headers.insert(PAYLOAD_HEADER, value);

        inject_trace_context(&mut headers);
        Ok(headers)
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    #[instrument(skip_all, fields(url = tracing::field::Empty, method = %request.method, actions = request.actions.len()))]
    async fn dispatch(&self, request: DispatchRequest) -> Result<Value, DispatchError> {
        let url = self.resolve(&request.target)?;
        tracing::Span::current().record("url", url.as_str());

        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| DispatchError::InvalidTarget(format!("invalid method: {}", request.method)))?;
        let headers = Self::headers(&request)?;

        let mut builder = self.client.request(method, &url).headers(headers);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), "response received");
        } else {
            warn!(url = %url, status = status.as_u16(), "non-success response");
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        parse_body(&bytes).map_err(|e| DispatchError::Decode {
            url,
            reason: e.to_string(),
        })
    }
}
