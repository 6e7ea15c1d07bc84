use serde::{Deserialize, Serialize};

use crate::error::ScriptError;

/// Default time budget for one script run: 3 seconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 3_000;

/// Minimum meaningful timeout: 1 ms.
pub const MIN_TIMEOUT_MS: u64 = 1;

/// Maximum timeout: 60 seconds.
pub const MAX_TIMEOUT_MS: u64 = 60_000;

/// Default maximum script source size: 64 KiB.
pub const DEFAULT_MAX_SOURCE_BYTES: usize = 64 * 1024;

/// Default cap on any single string value a script builds: 1 MiB.
pub const DEFAULT_MAX_STRING_BYTES: usize = 1024 * 1024;

/// Default cap on the approximate in-memory size of any single value a
/// script builds: 8 MiB.
pub const DEFAULT_MAX_VALUE_BYTES: usize = 8 * 1024 * 1024;

/// Default limit on syntactic nesting: parentheses, unary operators,
/// operator and postfix chains, nested blocks.
pub const DEFAULT_MAX_NESTING: usize = 64;

/// Highest accepted nesting limit; deeper trees risk the worker's stack.
pub const MAX_NESTING: usize = 256;

/// Deepest list or map a script may build. Matches the recursion limit
/// `serde_json` applies when decoding.
pub const MAX_VALUE_DEPTH: usize = 128;

/// Limits applied to every script the sandbox runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Wall-clock budget per script, in milliseconds.
    pub timeout_ms: u64,
    /// Largest accepted source text.
    pub max_source_bytes: usize,
    /// Largest string value a script may produce.
    pub max_string_bytes: usize,
    /// Largest approximate size of any list, map or context entry a script
    /// may produce, and of everything one run stores in total.
    pub max_value_bytes: usize,
    /// Deepest syntactic nesting the parser accepts.
    pub max_nesting: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
            max_string_bytes: DEFAULT_MAX_STRING_BYTES,
            max_value_bytes: DEFAULT_MAX_VALUE_BYTES,
            max_nesting: DEFAULT_MAX_NESTING,
        }
    }
}

impl SandboxConfig {
    #[must_use]
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    #[must_use]
    pub fn with_max_source_bytes(mut self, bytes: usize) -> Self {
        self.max_source_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_max_string_bytes(mut self, bytes: usize) -> Self {
        self.max_string_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_max_value_bytes(mut self, bytes: usize) -> Self {
        self.max_value_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_max_nesting(mut self, depth: usize) -> Self {
        self.max_nesting = depth;
        self
    }

    /// Reject out-of-range limits.
    pub fn validate(&self) -> Result<(), ScriptError> {
        if self.timeout_ms < MIN_TIMEOUT_MS {
            return Err(ScriptError::InvalidConfig(format!(
                "timeout_ms must be at least {MIN_TIMEOUT_MS}"
            )));
        }
        if self.timeout_ms > MAX_TIMEOUT_MS {
            return Err(ScriptError::InvalidConfig(format!(
                "timeout_ms must not exceed {MAX_TIMEOUT_MS} (got {})",
                self.timeout_ms
            )));
        }
        if self.max_source_bytes == 0 {
            return Err(ScriptError::InvalidConfig(
                "max_source_bytes must be greater than zero".into(),
            ));
        }
        if self.max_string_bytes == 0 {
            return Err(ScriptError::InvalidConfig(
                "max_string_bytes must be greater than zero".into(),
            ));
        }
        if self.max_value_bytes == 0 {
            return Err(ScriptError::InvalidConfig(
                "max_value_bytes must be greater than zero".into(),
            ));
        }
        if self.max_nesting == 0 || self.max_nesting > MAX_NESTING {
            return Err(ScriptError::InvalidConfig(format!(
                "max_nesting must be between 1 and {MAX_NESTING} (got {})",
                self.max_nesting
            )));
        }
        Ok(())
    }
}
