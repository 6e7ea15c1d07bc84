use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::warn;

use hopsim_core::PayloadError;

/// Errors that can occur when running a node.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error (e.g. binding the listener).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The inbound continuation payload was missing or unusable.
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Payload(PayloadError::Missing) => {
                (StatusCode::BAD_REQUEST, PayloadError::Missing.to_string())
            }
            Self::Payload(e) => {
                warn!(error = %e, code = e.code(), "rejected simulation payload");
                (
                    StatusCode::BAD_REQUEST,
                    "Invalid simulation payload".to_owned(),
                )
            }
            Self::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            Self::Io(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };

        (status, axum::Json(serde_json::json!({ "error": message }))).into_response()
    }
}
