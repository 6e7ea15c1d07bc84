use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use hopsim_core::{ActionList, DEFAULT_METHOD, HttpAction, PayloadError, Target};

/// Errors raised while sending an `http` action to its target.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The action names a node that is not in the directory.
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// The action has no usable target.
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// The nested action list could not be encoded.
    #[error("payload encoding failed: {0}")]
    Payload(#[from] PayloadError),

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body was not JSON.
    #[error("undecodable response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

impl DispatchError {
    pub fn code(&self) -> &'static str {
        "DISPATCH_FAILURE"
    }
}

/// One outbound call: where it goes, how, and the program the callee runs.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRequest {
    pub target: Target,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    /// Application body, sent as JSON when present.
    pub body: Option<Value>,
    /// Continuation program for the callee.
    pub actions: ActionList,
}

impl DispatchRequest {
    /// A `GET` with no headers and no body.
    pub fn new(target: Target, actions: ActionList) -> Self {
        Self {
            target,
            method: DEFAULT_METHOD.to_owned(),
            headers: BTreeMap::new(),
            body: None,
            actions,
        }
    }

    /// Build the request described by an `http` action.
    pub fn from_action(call: &HttpAction) -> Result<Self, DispatchError> {
        let target = call.target().ok_or_else(|| {
            DispatchError::InvalidTarget(format!(
                "http action '{}' has neither origin nor node",
                call.label()
            ))
        })?;
        Ok(Self {
            target,
            method: call.method.clone(),
            headers: call.headers.clone(),
            body: call.body.clone(),
            actions: call.actions.clone(),
        })
    }

    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Sends continuation calls to other nodes.
///
/// Implementations encode `actions` into the payload header, send the
/// request, and return the parsed response body whatever its status.
#[async_trait]
pub trait Dispatcher: Send + Sync + std::fmt::Debug {
    async fn dispatch(&self, request: DispatchRequest) -> Result<Value, DispatchError>;
}
