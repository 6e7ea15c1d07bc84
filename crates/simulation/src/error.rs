//! Error types for the simulation crate.

use thiserror::Error;

use hopsim_executor::DispatchError;
use hopsim_server::error::ServerError;

/// Errors that can occur while setting up or running a simulation.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Invalid harness or node configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The scenario file could not be read or parsed.
    #[error("invalid scenario: {0}")]
    Scenario(String),

    /// No ports available for allocation.
    #[error("no ports available for allocation")]
    PortExhausted,

    /// A request references a node the scenario does not define.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A node failed to start or stopped with an error.
    #[error("node error: {0}")]
    Server(#[from] ServerError),

    /// A node task ended abnormally.
    #[error("node {node} failed: {reason}")]
    NodeFailed { node: String, reason: String },

    /// A root request could not be sent.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// HTTP client error.
    #[error("client error: {0}")]
    Client(#[from] hopsim_client::Error),
}
