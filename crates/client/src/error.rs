use thiserror::Error;

use hopsim_core::PayloadError;

/// Errors returned by [`NodeClient`](crate::NodeClient).
#[derive(Debug, Error)]
pub enum Error {
    /// The request never reached the node.
    #[error("connection error: {0}")]
    Connection(String),

    /// The node answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The response body was not what the endpoint promises.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// The client could not be built.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The action list could not be encoded into the payload header.
    #[error(transparent)]
    Payload(#[from] PayloadError),
}
