/// Errors raised while parsing or running a script.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScriptError {
    /// The script ran longer than its time budget.
    #[error("script timed out after {0}ms")]
    Timeout(u64),

    /// The source could not be parsed.
    #[error("script parse error: {0}")]
    Parse(String),

    /// The script raised a runtime fault (division by zero, oversized
    /// string, assignment to a constant, ...).
    #[error("script fault: {0}")]
    Fault(String),

    /// An operator or builtin received a value of the wrong type.
    #[error("type error: {0}")]
    TypeError(String),

    /// A name was read before it was bound.
    #[error("{0} is not defined")]
    UndefinedVariable(String),

    /// A call to a function that does not exist.
    #[error("unknown function: {0}")]
    UndefinedFunction(String),

    /// A capability call failed or the capability is not available.
    #[error("capability error: {0}")]
    Capability(String),

    /// The sandbox configuration is invalid.
    #[error("invalid sandbox config: {0}")]
    InvalidConfig(String),
}

impl ScriptError {
    /// Machine-readable failure code carried in failure values.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "SCRIPT_TIMEOUT",
            _ => "SCRIPT_FAULT",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
