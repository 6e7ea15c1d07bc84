//! Assembly of a running node: transport, sandbox, interpreter and listener.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};

use hopsim_client::{HttpDispatcher, HttpScriptClient};
use hopsim_core::NodeDirectory;
use hopsim_executor::Interpreter;
use hopsim_script::Sandbox;

use crate::api::{self, AppState};
use crate::config::NodeConfig;
use crate::error::ServerError;

/// Wire up the handler state for a node.
///
/// `directory` resolves logical node references in outbound calls; nodes of
/// one simulation share it.
pub fn build_state(
    config: &NodeConfig,
    directory: Arc<NodeDirectory>,
) -> Result<AppState, ServerError> {
    let timeout = config.dispatch_timeout();
    let dispatcher = HttpDispatcher::new(directory, timeout)
        .map_err(|e| ServerError::Config(e.to_string()))?;
    let script_http =
        HttpScriptClient::new(timeout).map_err(|e| ServerError::Config(e.to_string()))?;
    let sandbox = Sandbox::new(config.script)
        .map_err(|e| ServerError::Config(e.to_string()))?
        .with_http(Arc::new(script_http));

    Ok(AppState {
        node: config.node.name.as_str().into(),
        interpreter: Interpreter::new(Arc::new(dispatcher), Arc::new(sandbox), config.executor),
        limits: config.payload,
    })
}

/// Serve `state` on `listener` until `shutdown` resolves, then give detached
/// actions up to `drain_timeout` to finish.
pub async fn serve<F>(
    listener: TcpListener,
    state: AppState,
    shutdown: F,
    drain_timeout: Duration,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let interpreter = state.interpreter.clone();
    let node = state.node.clone();

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    let pending = interpreter.detached_tasks();
    if pending > 0 {
        info!(node = %node, pending, "waiting for detached actions");
    }
    if !interpreter.drain(drain_timeout).await {
        warn!(
            node = %node,
            pending = interpreter.detached_tasks(),
            timeout_secs = drain_timeout.as_secs(),
            "shutdown timeout exceeded, abandoning detached actions"
        );
    }
    Ok(())
}
