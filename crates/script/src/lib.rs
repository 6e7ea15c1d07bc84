//! Sandboxed script hook for `code` actions.
//!
//! Scripts are written in a small expression-and-statement language with no
//! loops, no function definitions and no ambient state. A script reads and
//! writes the invocation's context store through `ctx`, logs through
//! `logger`, and may call out through `http` when the host provides it. Every
//! run is bounded by a wall-clock budget.

pub mod ast;
pub mod builtins;
pub mod config;
pub mod error;
pub mod eval;
pub mod hook;
pub mod parser;
pub mod sandbox;
pub mod value;

use hopsim_core::ContextStore;
use parking_lot::Mutex;

pub use config::SandboxConfig;
pub use error::ScriptError;
pub use hook::{ScriptHook, ScriptHttp};
pub use sandbox::Sandbox;
pub use value::Value;

/// Mock script hook for testing callers without interpreting anything.
///
/// Always returns the configured value and records every source it was
/// asked to run.
#[derive(Debug, Default)]
pub struct MockScriptHook {
    value: serde_json::Value,
    sources: Mutex<Vec<String>>,
}

impl MockScriptHook {
    /// Create a mock hook that always returns `value`.
    pub fn new(value: serde_json::Value) -> Self {
        Self {
            value,
            sources: Mutex::new(Vec::new()),
        }
    }

    /// Sources received so far, in call order.
    pub fn sources(&self) -> Vec<String> {
        self.sources.lock().clone()
    }
}

#[async_trait::async_trait]
impl ScriptHook for MockScriptHook {
    async fn run(
        &self,
        source: &str,
        _ctx: &mut ContextStore,
    ) -> Result<serde_json::Value, ScriptError> {
        self.sources.lock().push(source.to_owned());
        Ok(self.value.clone())
    }
}

/// A script hook that always fails with a clone of the configured error.
#[derive(Debug)]
pub struct FailingScriptHook {
    error: ScriptError,
}

impl FailingScriptHook {
    pub fn new(error: ScriptError) -> Self {
        Self { error }
    }

    /// Fails every run with [`ScriptError::Timeout`].
    pub fn timeout(ms: u64) -> Self {
        Self::new(ScriptError::Timeout(ms))
    }
}

#[async_trait::async_trait]
impl ScriptHook for FailingScriptHook {
    async fn run(
        &self,
        _source: &str,
        _ctx: &mut ContextStore,
    ) -> Result<serde_json::Value, ScriptError> {
        Err(self.error.clone())
    }
}
