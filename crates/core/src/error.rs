use thiserror::Error;

/// Failure to read or write a continuation payload.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The request carried no payload header.
    #[error("Missing X-Simulation-Payload header")]
    Missing,

    /// The header was present but did not hold a valid, acceptable action
    /// list.
    #[error("malformed simulation payload: {0}")]
    Malformed(String),

    /// An outbound action list could not be serialized.
    #[error("failed to encode simulation payload: {0}")]
    Encode(String),
}

impl PayloadError {
    /// Stable code used in logs and error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Missing => "MISSING_PAYLOAD",
            Self::Malformed(_) => "MALFORMED_PAYLOAD",
            Self::Encode(_) => "PAYLOAD_ENCODE",
        }
    }
}
