use thiserror::Error;

use hopsim_script::ScriptError;

use crate::dispatch::DispatchError;

/// A fault that aborts an `execute` call.
///
/// A `return` is not an error; it travels as [`Flow::Return`](crate::Flow).
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// `multi` groups nest deeper than the configured limit.
    #[error("action nesting depth {depth} exceeds limit {max}")]
    DepthExceeded { depth: usize, max: usize },
}

impl ExecutionError {
    /// Stable code carried in the structured failure value.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Script(err) => err.code(),
            Self::Dispatch(err) => err.code(),
            Self::DepthExceeded { .. } => "DEPTH_EXCEEDED",
        }
    }
}
