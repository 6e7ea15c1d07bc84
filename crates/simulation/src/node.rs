//! A node running inside the simulation process.

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use hopsim_client::NodeClient;
use hopsim_core::NodeIdentity;
use hopsim_server::error::ServerError;

use crate::error::SimulationError;

/// One in-process node: a served router plus the means to stop it.
///
/// Dropping a `SimNode` signals shutdown without waiting for it; use
/// [`SimNode::stop`] to wait for detached actions to drain.
pub struct SimNode {
    identity: NodeIdentity,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<Result<(), ServerError>>>,
}

impl SimNode {
    pub(crate) fn new(
        identity: NodeIdentity,
        shutdown_tx: oneshot::Sender<()>,
        handle: JoinHandle<Result<(), ServerError>>,
    ) -> Self {
        Self {
            identity,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Identity with the port actually bound.
    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn name(&self) -> &str {
        self.identity.name.as_str()
    }

    pub fn base_url(&self) -> String {
        self.identity.base_url()
    }

    pub fn client(&self) -> Result<NodeClient, SimulationError> {
        Ok(NodeClient::builder(self.base_url()).build()?)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal graceful shutdown and wait for the node to finish draining.
    pub async fn stop(&mut self) -> Result<(), SimulationError> {
        if let Some(tx) = self.shutdown_tx.take() {
            // The receiver is gone only if the node already stopped.
            let _ = tx.send(());
        }
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        match handle.await {
            Ok(Ok(())) => {
                info!(node = %self.identity.name, "simulated node stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(SimulationError::NodeFailed {
                node: self.identity.name.to_string(),
                reason: e.to_string(),
            }),
            Err(e) => Err(SimulationError::NodeFailed {
                node: self.identity.name.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

impl Drop for SimNode {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take()
            && tx.send(()).is_err()
        {
            warn!(node = %self.identity.name, "simulated node was already stopped");
        }
    }
}

impl std::fmt::Debug for SimNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimNode")
            .field("identity", &self.identity)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
