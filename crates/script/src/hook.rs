use hopsim_core::ContextStore;

use crate::error::ScriptError;

/// Runs a `code` action's source against the invocation's context store.
///
/// The store is passed explicitly; implementations must not reach any other
/// mutable state of the node. The returned value becomes the action's
/// result.
#[async_trait::async_trait]
pub trait ScriptHook: Send + Sync + std::fmt::Debug {
    async fn run(
        &self,
        source: &str,
        ctx: &mut ContextStore,
    ) -> Result<serde_json::Value, ScriptError>;
}

/// Outbound HTTP capability exposed to scripts as the `http` object.
///
/// Returns the parsed response body.
#[async_trait::async_trait]
pub trait ScriptHttp: Send + Sync + std::fmt::Debug {
    async fn request(
        &self,
        method: &str,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, ScriptError>;
}
