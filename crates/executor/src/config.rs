use serde::{Deserialize, Serialize};

use hopsim_core::DEFAULT_WAIT_MS;

/// Default maximum nesting depth of `multi` groups interpreted locally.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Configuration for the [`Interpreter`](crate::Interpreter).
///
/// # Examples
///
/// ```
/// use hopsim_executor::InterpreterConfig;
///
/// let config = InterpreterConfig::default();
/// assert_eq!(config.max_depth, 32);
/// assert_eq!(config.default_wait_ms, 1000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Deepest `multi` nesting the interpreter descends into. A flat list is
    /// depth 1.
    pub max_depth: usize,
    /// Sleep applied by a `wait` action that carries no `duration`.
    pub default_wait_ms: u64,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            default_wait_ms: DEFAULT_WAIT_MS,
        }
    }
}
